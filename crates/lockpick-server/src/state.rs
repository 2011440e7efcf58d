//! Shared application state.

use std::sync::Arc;

use crate::engine::Engine;
use crate::hub::Hub;
use crate::store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub hub: Arc<Hub>,
    pub engine: Engine,
}
