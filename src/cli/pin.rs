use super::context::print_json;
use pinrelay::cid::ContentId;
use pinrelay::orchestrator::{PinningResult, ReplicationSummary};
use pinrelay::service::PinService;
use std::fmt::Write;

/// Pin on the local node and every provider, waiting for confirmation.
pub async fn pin(service: &PinService, cid: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let cid = ContentId::parse(cid)?;
    let results = service.pin_to_all_providers(&cid, None).await;
    if json {
        return print_json(&results);
    }
    println!("{}", cid);
    print!("{}", format_results(&results));
    Ok(())
}

pub async fn unpin(service: &PinService, cid: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let cid = ContentId::parse(cid)?;
    let results = service.unpin(&cid).await;
    if json {
        return print_json(&results);
    }
    println!("{}", cid);
    print!("{}", format_results(&results));
    Ok(())
}

/// One line per target plus a summary line.
pub fn format_results(results: &[PinningResult]) -> String {
    let mut out = String::new();
    for result in results {
        let state = match (result.success, result.acknowledged) {
            (true, _) => "ok",
            (false, true) => "unconfirmed",
            (false, false) => "failed",
        };
        let _ = write!(out, "  {:<12} {}", result.provider, state);
        if let Some(error) = &result.error {
            let _ = write!(out, " ({})", error);
        }
        out.push('\n');
    }

    let summary = ReplicationSummary::from_results(results);
    let _ = writeln!(out, "  {}/{} targets succeeded", summary.succeeded, summary.total);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_results() {
        let results = vec![
            PinningResult::confirmed("local"),
            PinningResult::unconfirmed("cloud", "not confirmed after 5 attempts"),
            PinningResult::failed("companion", "connection refused"),
        ];

        let text = format_results(&results);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("local") && lines[0].ends_with("ok"));
        assert!(lines[1].contains("unconfirmed (not confirmed after 5 attempts)"));
        assert!(lines[2].contains("failed (connection refused)"));
        assert_eq!(lines[3].trim(), "1/3 targets succeeded");
    }
}
