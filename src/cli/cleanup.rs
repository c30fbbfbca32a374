use super::context::print_json;
use super::StuckStatus;
use pinrelay::remote::ProviderStatus;
use pinrelay::service::PinService;

/// Remove remote pins stuck in any of `statuses`.
///
/// Every candidate is re-checked first; pins a provider now reports as
/// pinned are kept.
pub async fn execute(
    service: &PinService,
    statuses: &[StuckStatus],
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let statuses: Vec<ProviderStatus> = statuses.iter().copied().map(ProviderStatus::from).collect();
    let reports = service.cleanup_stuck(&statuses).await;
    if json {
        return print_json(&reports);
    }

    if reports.is_empty() {
        println!("No remote providers configured.");
        return Ok(());
    }
    for report in &reports {
        println!(
            "{}: removed {}, kept {}, errors {}",
            report.provider,
            report.removed_count,
            report.skipped,
            report.errors.len()
        );
        for error in &report.errors {
            println!("  ! {}", error);
        }
    }
    Ok(())
}
