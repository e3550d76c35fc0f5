use crate::db::DbPool;
use crate::ws::registry::PresenceRegistry;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection wrapped in Arc<Mutex>
    pub db: DbPool,
    /// JWT signing secret (256-bit random key)
    pub jwt_secret: Vec<u8>,
    /// Who is online and how to reach them. Mutated only by the
    /// connection lifecycle in ws::actor; read by the relay and the
    /// signaling router.
    pub registry: PresenceRegistry,
}
