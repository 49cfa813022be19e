//! Namespaces command implementation

use anyhow::{Context, Result};
use tandem_core::ProcessId;
use tandem_namespace::NamespaceInfo;

pub fn execute(pid: Option<i32>) -> Result<()> {
    let target_pid = pid.map_or_else(ProcessId::current, ProcessId::from_raw);

    println!("\n🔒 Namespace Information for PID {target_pid}");
    println!("{:-<60}", "");

    let ns_info =
        NamespaceInfo::for_pid(target_pid).context("Failed to get namespace information")?;

    print!("{ns_info}");

    match ns_info.is_isolated() {
        Ok(true) => println!("\n✅ Process is in isolated namespaces"),
        Ok(false) => println!("\n⚠️  Process is in host namespaces"),
        Err(e) => println!("\n❌ Failed to check isolation: {e}"),
    }

    Ok(())
}
