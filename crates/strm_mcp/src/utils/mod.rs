mod http_client;
pub use http_client::build_client;

pub mod logging;

mod qr_image;
pub use qr_image::write_qr_image;
