use super::context::print_json;
use pinrelay::service::{PinService, ProviderListing};
use std::fmt::Write;

/// List pins on every target, including in-flight remote pins.
pub async fn execute(service: &PinService, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let listings = service.list_pins().await;
    if json {
        return print_json(&listings);
    }
    print!("{}", format_listings(&listings));
    Ok(())
}

pub fn format_listings(listings: &[ProviderListing]) -> String {
    let mut out = String::new();
    for listing in listings {
        match &listing.error {
            Some(error) => {
                let _ = writeln!(out, "{}: listing failed ({})", listing.provider, error);
            }
            None => {
                let _ = writeln!(out, "{}: {} pins", listing.provider, listing.records.len());
            }
        }
        for record in &listing.records {
            let _ = write!(out, "  {} {}", record.identifier, record.state);
            if let Some(name) = &record.name {
                let _ = write!(out, " {}", name);
            }
            out.push('\n');
        }
    }
    out
}
