//! Scripted `HostApi` for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{
    error::{HostError, HostResult},
    host_api::HostApi,
};

#[derive(Default)]
struct RouteScript {
    replies: VecDeque<HostResult<Value>>,
    fallback: Option<Value>,
    delay: Option<Duration>,
    paths: Vec<String>,
    bodies: Vec<Value>,
    in_flight: usize,
    max_in_flight: usize,
}

/// Replies to routes (the last path segment, query stripped) from queued
/// responses, recording every call.
#[derive(Default)]
pub struct ScriptedHost {
    routes: Mutex<HashMap<String, RouteScript>>,
}

fn route_name(path: &str) -> String {
    let path = path.split('?').next().unwrap_or(path);
    path.rsplit('/').next().unwrap_or(path).to_string()
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_route<T>(&self, route: &str, f: impl FnOnce(&mut RouteScript) -> T) -> T {
        let mut routes = self.routes.lock().unwrap();
        f(routes.entry(route.to_string()).or_default())
    }

    pub fn push_get(&self, route: &str, value: Value) {
        self.with_route(route, |script| script.replies.push_back(Ok(value)));
    }

    pub fn push_post(&self, route: &str, value: Value) {
        self.push_get(route, value);
    }

    pub fn push_get_error(&self, route: &str) {
        let error = HostError::Transport {
            path: route.to_string(),
            message: "connection reset".to_string(),
        };
        self.with_route(route, |script| script.replies.push_back(Err(error)));
    }

    /// Reply used once the queue for `route` is empty
    pub fn set_fallback_get(&self, route: &str, value: Value) {
        self.with_route(route, |script| script.fallback = Some(value));
    }

    pub fn set_delay(&self, route: &str, delay: Duration) {
        self.with_route(route, |script| script.delay = Some(delay));
    }

    pub fn calls(&self, route: &str) -> usize {
        self.with_route(route, |script| script.paths.len())
    }

    pub fn paths(&self, route: &str) -> Vec<String> {
        self.with_route(route, |script| script.paths.clone())
    }

    pub fn bodies(&self, route: &str) -> Vec<Value> {
        self.with_route(route, |script| script.bodies.clone())
    }

    pub fn max_in_flight(&self, route: &str) -> usize {
        self.with_route(route, |script| script.max_in_flight)
    }

    async fn respond(&self, path: &str, body: Option<Value>) -> HostResult<Value> {
        let route = route_name(path);
        let (delay, reply) = self.with_route(&route, |script| {
            script.paths.push(path.to_string());
            if let Some(body) = body {
                script.bodies.push(body);
            }
            script.in_flight += 1;
            script.max_in_flight = script.max_in_flight.max(script.in_flight);
            let reply = script
                .replies
                .pop_front()
                .or_else(|| script.fallback.clone().map(Ok))
                .unwrap_or_else(|| {
                    Err(HostError::Http {
                        path: path.to_string(),
                        status: 404,
                    })
                });
            (script.delay, reply)
        });

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.with_route(&route, |script| script.in_flight -= 1);
        reply
    }
}

#[async_trait]
impl HostApi for ScriptedHost {
    async fn get(&self, path: &str) -> HostResult<Value> {
        self.respond(path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> HostResult<Value> {
        self.respond(path, Some(body)).await
    }
}
