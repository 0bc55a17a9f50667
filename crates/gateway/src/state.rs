//! Shared application state, grouped by concern the way the teacher groups
//! its `AppState` fields.

use std::sync::Arc;

use presence_auth::SecretResolver;
use presence_domain::config::Config;
use presence_pathfinding::Grid;
use presence_registry_client::RegistryClient;
use presence_store::Store;

use crate::directory::RoomDirectory;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    // Persistence
    pub store: Arc<Store>,

    // Registry integration
    pub registry: Arc<RegistryClient>,
    pub resolver: Arc<SecretResolver>,

    // Room/namespace state
    pub directory: Arc<RoomDirectory>,

    // Pathfinding
    pub pathfind_grid: Option<Arc<Grid>>,
}
