use mongodb::Client;
use mongodb::bson::doc;
use tracing::debug;

use crate::common::DatabaseError;

/// Run `ping` against the admin database.
pub async fn check_health(client: &Client) -> Result<(), DatabaseError> {
    debug!("Running MongoDB health check");

    client
        .database("admin")
        .run_command(doc! { "ping": 1 })
        .await
        .map_err(|e| DatabaseError::HealthCheckFailed(format!("MongoDB ping failed: {}", e)))?;

    debug!("MongoDB health check passed");
    Ok(())
}
