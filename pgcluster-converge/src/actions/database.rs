//! Roles and databases on the master

use pgcluster_models::{DatabaseSpec, REPLICATOR_ROLE};

use crate::actions::ActionContext;
use crate::error::Result;
use crate::sql::{self, Psql};
use crate::types::Action;

pub async fn create_role(ctx: &ActionContext<'_>, action: &Action, name: &str, password: &str) -> Result<()> {
    let statement = sql::create_role(name, password, name == REPLICATOR_ROLE);
    ctx.run(action, &Psql::new(ctx.cluster, ctx.server).sql(&statement)).await?;
    tracing::info!(host = %ctx.server.domain, "Created role {}", name);
    Ok(())
}

pub async fn create_database(ctx: &ActionContext<'_>, action: &Action, database: &DatabaseSpec) -> Result<()> {
    let statement = sql::create_database(database);
    ctx.run(action, &Psql::new(ctx.cluster, ctx.server).sql(&statement)).await?;
    tracing::info!(host = %ctx.server.domain, "Created database {}", database.name);
    Ok(())
}

pub async fn grant_database(ctx: &ActionContext<'_>, action: &Action, database: &DatabaseSpec) -> Result<()> {
    let statement = sql::grant_database(database);
    ctx.run(action, &Psql::new(ctx.cluster, ctx.server).sql(&statement)).await?;
    tracing::info!(host = %ctx.server.domain, "Granted {} on {}", database.role, database.name);
    Ok(())
}
