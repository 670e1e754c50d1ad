use std::fmt::Write;

use crate::footprint::{Confidence, FootprintEstimate};

fn confidence_label(confidence: Confidence) -> &'static str {
    match confidence {
        Confidence::High => "High",
        Confidence::Medium => "Medium",
        Confidence::Low => "Low",
    }
}

/// Markdown report for the final pipeline stage
pub fn render(estimate: &FootprintEstimate) -> String {
    let mut out = String::new();
    let b = &estimate.breakdown;
    // Writing to a String cannot fail.
    let _ = write!(
        out,
        "**CARBON FOOTPRINT ANALYSIS COMPLETE**\n\n\
         **Product:** {}\n\
         **Total Carbon Footprint:** {} kg CO₂e\n\n\
         **Detailed Breakdown:**\n\
         - **Production Impact:** {} kg CO₂e\n\
         - **Packaging Impact:** {} kg CO₂e\n\
         - **Transport Impact:** {} kg CO₂e\n\n\
         **Data Source:** {}\n\
         **Confidence Level:** {}\n\
         **Analysis Notes:** {}\n\n\
         **Formula:** {}",
        estimate.canonical_name,
        estimate.total_co2e_kg,
        b.production,
        b.packaging,
        b.transport,
        estimate.source,
        confidence_label(estimate.confidence),
        estimate.notes,
        estimate.formula,
    );
    out
}
