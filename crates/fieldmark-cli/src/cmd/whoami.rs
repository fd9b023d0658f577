use crate::output::print_json;
use crate::session::{connect, signed_in_user, ConnectArgs};
use anyhow::Context;
use fieldmark_core::roster::RosterProvider;
use std::path::Path;

pub fn run(root: &Path, conn: &ConnectArgs, json: bool) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(whoami(root, conn, json))
}

async fn whoami(root: &Path, conn: &ConnectArgs, json: bool) -> anyhow::Result<()> {
    let (_, client) = connect(root, conn).await?;
    let user = signed_in_user(&client).await?;
    let employee = client
        .resolve_supervisor(&user)
        .await
        .context("employee lookup failed")?;

    if json {
        return print_json(&serde_json::json!({ "user": user, "employee": employee }));
    }

    println!("User:     {user}");
    match employee {
        Some(e) => println!("Employee: {} ({})", e.display_name(), e.name),
        None => println!("Employee: (no employee record linked to this user)"),
    }
    Ok(())
}
