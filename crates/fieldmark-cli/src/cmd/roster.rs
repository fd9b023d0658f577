use crate::output::{cell, print_json, print_table};
use crate::session::{connect, signed_in_user, ConnectArgs};
use anyhow::Context;
use erpnext_client::ErpClient;
use fieldmark_core::roster::{display_roster, filter_roster, RosterProvider};
use fieldmark_core::types::Employee;
use std::path::Path;

pub fn run(
    root: &Path,
    search: Option<&str>,
    conn: &ConnectArgs,
    json: bool,
) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let (_, client) = connect(root, conn).await?;
        let roster = load(&client).await?;
        let shown = filter_roster(&roster, search.unwrap_or(""));

        if json {
            return print_json(&shown);
        }
        if shown.is_empty() {
            println!("No employees match.");
            return Ok(());
        }
        let rows = shown
            .iter()
            .map(|e| {
                vec![
                    e.name.clone(),
                    e.display_name().to_string(),
                    cell(e.department.as_deref()),
                    cell(e.designation.as_deref()),
                ]
            })
            .collect();
        print_table(&["ID", "NAME", "DEPARTMENT", "DESIGNATION"], rows);
        Ok(())
    })
}

/// The signed-in supervisor followed by everyone they manage.
pub async fn load(client: &ErpClient) -> anyhow::Result<Vec<Employee>> {
    let user = signed_in_user(&client).await?;
    let supervisor = client
        .resolve_supervisor(&user)
        .await
        .context("supervisor lookup failed")?
        .with_context(|| format!("no employee record is linked to {user}"))?;
    let managed = client
        .managed_employees(&supervisor)
        .await
        .context("roster lookup failed")?;
    Ok(display_roster(Some(&supervisor), &managed))
}
