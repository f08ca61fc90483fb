use std::time::Duration;

use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

/// Builds the Postgres pool for a service. Sizing is caller-driven: the
/// matching engine passes its request-path headroom plus the refresher's
/// `max_concurrent_scoring`, since every concurrent scoring task holds a
/// connection while it writes its score batch.
pub fn create_pool(database_url: &str, max_size: u32) -> anyhow::Result<DbPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = Pool::builder()
        .max_size(max_size.max(1))
        .connection_timeout(Duration::from_secs(5))
        .test_on_check_out(true)
        .build(manager)?;

    tracing::info!(max_size = pool.max_size(), "database connection pool created");
    Ok(pool)
}
