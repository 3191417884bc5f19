use crate::actions::ActionContext;
use crate::command::ufw_allow;
use crate::error::Result;
use crate::types::Action;

pub async fn allow_firewall_port(ctx: &ActionContext<'_>, action: &Action) -> Result<()> {
    ctx.run(action, &ufw_allow(ctx.server.port)).await?;
    tracing::info!(host = %ctx.server.domain, "Allowed {}/tcp through ufw", ctx.server.port);
    Ok(())
}
