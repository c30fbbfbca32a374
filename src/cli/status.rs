use super::context::print_json;
use pinrelay::cid::ContentId;
use pinrelay::reconcile::PinningStatusSnapshot;
use pinrelay::service::PinService;
use std::fmt::Write;

/// Ask every target directly whether it holds a pin for `cid`.
///
/// Providers that are not configured do not appear. An unreachable provider
/// reports `no`.
pub async fn execute(service: &PinService, cid: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let cid = ContentId::parse(cid)?;
    let snapshot = service.reconcile(&cid).await;
    if json {
        return print_json(&snapshot);
    }
    print!("{}", format_snapshot(&snapshot));
    Ok(())
}

pub fn format_snapshot(snapshot: &PinningStatusSnapshot) -> String {
    let mut out = format!("{}\n", snapshot.identifier);
    for (provider, pinned) in &snapshot.per_provider {
        let _ = writeln!(out, "  {:<12} {}", provider, if *pinned { "pinned" } else { "no" });
    }
    out
}
