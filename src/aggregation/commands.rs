use anyhow::Result;

use crate::identity::UserId;

use super::SessionAggregationService;

pub async fn print_summary(service: &SessionAggregationService, user: &str) -> Result<()> {
    let user = UserId::new(user)?;
    let summary = service.list(&user).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

pub async fn clear_sessions(service: &SessionAggregationService, user: &str) -> Result<()> {
    let user = UserId::new(user)?;
    let deleted = service.clear(&user).await?;
    println!("Deleted {deleted} session(s) for {user}");
    Ok(())
}
