//! Route table shared by the built-in routes and every API component
//!
//! Components register `(path, method, handler)` triples on a `RouteTable`
//! while the server is being assembled; `RouteTable::build` then compiles the
//! paths into a `matchit` router used for dispatch.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, Response};
use log::debug;
use matchit::{Match, Router};

use crate::{
    config_error,
    core::error::RelayResult,
    utils::response::{CommonErrors, ResponseBuilder},
};

/// A request as seen by route handlers
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub method: Method,
    pub path: String,
    pub params: BTreeMap<String, String>,
    pub body: Bytes,
}

impl RelayRequest {
    pub fn new(method: Method, path: impl Into<String>, body: Bytes) -> Self {
        Self {
            method,
            path: path.into(),
            params: BTreeMap::new(),
            body,
        }
    }

    /// Path parameter captured by the route pattern
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, req: &RelayRequest) -> RelayResult<Response<Vec<u8>>>;
}

type MethodHandlers = HashMap<Method, Arc<dyn Handler>>;

/// Mutable route table filled during server assembly
#[derive(Default)]
pub struct RouteTable {
    paths: Vec<(String, MethodHandlers)>,
    index: HashMap<String, usize>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler for `method` on `path`.
    ///
    /// Registering the same method twice on the same path is rejected, so a
    /// component can never replace a route owned by someone else.
    pub fn route(
        &mut self,
        path: &str,
        method: Method,
        handler: Arc<dyn Handler>,
    ) -> RelayResult<&mut Self> {
        let idx = match self.index.get(path) {
            Some(idx) => *idx,
            None => {
                self.paths.push((path.to_string(), HashMap::new()));
                self.index.insert(path.to_string(), self.paths.len() - 1);
                self.paths.len() - 1
            }
        };

        let handlers = &mut self.paths[idx].1;
        if handlers.contains_key(&method) {
            return Err(config_error!("route {} {} registered twice", method, path));
        }
        debug!("Registering route {method} {path}");
        handlers.insert(method, handler);
        Ok(self)
    }

    /// Number of distinct paths registered
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Compile the table into a dispatchable router
    pub fn build(self) -> RelayResult<RelayRouter> {
        let mut router = Router::new();
        let mut handlers = Vec::with_capacity(self.paths.len());

        for (idx, (path, methods)) in self.paths.into_iter().enumerate() {
            router
                .insert(path.as_str(), idx)
                .map_err(|e| config_error!("route {} conflicts: {}", path, e))?;
            handlers.push(methods);
        }

        Ok(RelayRouter { router, handlers })
    }
}

/// Immutable router used while serving requests
pub struct RelayRouter {
    router: Router<usize>,
    handlers: Vec<MethodHandlers>,
}

impl RelayRouter {
    /// Dispatch a request to its handler and turn the outcome into a response
    pub async fn dispatch(&self, mut req: RelayRequest) -> Response<Vec<u8>> {
        let (idx, params) = match self.router.at(&req.path) {
            Ok(Match { value, params }) => {
                let params: BTreeMap<String, String> = params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                (*value, params)
            }
            Err(_) => return CommonErrors::not_found(),
        };

        let Some(handler) = self.handlers[idx].get(&req.method) else {
            return CommonErrors::method_not_allowed();
        };

        req.params = params;
        match handler.handle(&req).await {
            Ok(resp) => resp,
            Err(e) => {
                debug!("Handler for {} {} failed: {e}", req.method, req.path);
                ResponseBuilder::error_http(e.status_code(), &e.to_string())
            }
        }
    }
}
