//! Catalog seeding command.

use tracing::info;

use stockroom_server::db::{PgStore, seed};

use super::{CommandError, connect};

/// Insert the default catalog when the product table is empty.
///
/// # Errors
///
/// Returns `CommandError` if the database is unreachable or the insert fails.
pub async fn run() -> Result<(), CommandError> {
    let store = PgStore::new(connect().await?);

    let inserted = seed::seed_if_empty(&store).await?;
    if inserted == 0 {
        info!("Nothing to do; catalog already present");
    } else {
        info!(products = inserted, "Catalog seeded");
    }
    Ok(())
}
