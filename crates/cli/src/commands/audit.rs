//! `helmsman audit`: tool execution records, newest last.

use crate::runtime;
use helmsman_config::AppConfig;
use helmsman_core::audit::{AuditFilter, AuditLog};

pub async fn run(
    config: &AppConfig,
    user: &str,
    conversation: Option<String>,
    tool: Option<String>,
    limit: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = runtime::open_store(config).await?;
    let records = store
        .records(AuditFilter {
            conversation_id: conversation,
            user_id: Some(user.to_string()),
            tool_name: tool,
            limit: Some(limit),
        })
        .await?;

    if records.is_empty() {
        println!("No audit records.");
        return Ok(());
    }

    for record in records {
        let status = if record.success { "ok  " } else { "FAIL" };
        println!(
            "{}  {status}  {:<22} {:<8} {:>6}ms  conv={}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.tool_name,
            record.action.as_str(),
            record.duration_ms,
            record.conversation_id.as_deref().unwrap_or("-"),
        );
        println!("      input:  {}", record.input);
        match (&record.output, &record.error) {
            (Some(output), _) => println!("      output: {output}"),
            (None, Some(error)) => println!("      error:  {error}"),
            (None, None) => {}
        }
    }
    Ok(())
}
