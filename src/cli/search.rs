use super::context::print_json;
use pinrelay::locator::{CidSearchResult, StorageTier};
use pinrelay::service::PinService;
use std::fmt::Write;

/// Search every local storage tier for the given identifiers.
///
/// Heuristic matches are marked with `~`.
pub async fn execute(service: &PinService, cids: &[String], json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let results = service.search(cids).await;
    if json {
        return print_json(&results);
    }
    print!("{}", format_results(&results));
    Ok(())
}

fn tier_name(tier: StorageTier) -> &'static str {
    match tier {
        StorageTier::PinRegistry => "pin-registry",
        StorageTier::BlockStore => "block-store",
        StorageTier::PersistentIndex => "index",
    }
}

pub fn format_results(results: &[CidSearchResult]) -> String {
    let mut out = String::new();
    for result in results {
        let verdict = if result.found { "found" } else { "not found" };
        let _ = writeln!(out, "{}: {}", result.identifier, verdict);

        for location in &result.locations {
            let marker = if location.match_kind.is_heuristic() { "~" } else { " " };
            let _ = write!(out, "  {}{:<13}", marker, tier_name(location.tier));
            let path: Vec<&str> = [&location.namespace, &location.store, &location.key]
                .into_iter()
                .filter_map(|part| part.as_deref())
                .collect();
            if !path.is_empty() {
                let _ = write!(out, " {}", path.join("/"));
            }
            let _ = writeln!(out, " {}", location.detail);
        }
        for error in &result.errors {
            let _ = writeln!(out, "  ! {}", error);
        }
    }
    out
}
