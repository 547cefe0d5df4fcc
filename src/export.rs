//! Result export: link loads and convergence history as CSV or JSON.
//!
//! ```text
//! TrafficClass.results ─▶ export_link_loads()         ─▶ link_id,car_ab,car_ba,car_tot,...
//! AssignmentReport     ─▶ export_convergence_report() ─▶ iteration,rgap,alpha,warnings,...
//!                      └▶ report_to_json()
//! ```

use std::io::Write;

use crate::assignment::{AssignmentReport, TrafficClass};
use crate::constants::Float;
use crate::Result;

/// Write a class's link loads as CSV, one row per network link.
///
/// One `_ab`/`_ba`/`_tot` triple per matrix core, then the same triple for
/// the PCE-weighted sum over cores.
pub fn export_link_loads(class: &TrafficClass, writer: &mut dyn Write) -> Result<()> {
    let loads = class.results.link_results(&class.graph);

    let mut header = vec!["link_id".to_string()];
    for core in &class.results.cores {
        header.push(format!("{core}_ab"));
        header.push(format!("{core}_ba"));
        header.push(format!("{core}_tot"));
    }
    header.extend(["PCE_AB".to_string(), "PCE_BA".to_string(), "PCE_tot".to_string()]);
    writeln!(writer, "{}", header.join(","))?;

    for load in &loads {
        let mut row = vec![load.link_id.to_string()];
        for c in 0..load.tot.len() {
            row.push(format_number(load.ab[c]));
            row.push(format_number(load.ba[c]));
            row.push(format_number(load.tot[c]));
        }
        let ab: Float = load.ab.iter().sum::<Float>() * class.pce;
        let ba: Float = load.ba.iter().sum::<Float>() * class.pce;
        row.push(format_number(ab));
        row.push(format_number(ba));
        row.push(format_number(ab + ba));
        writeln!(writer, "{}", row.join(","))?;
    }
    Ok(())
}

/// Write the iteration history as CSV. BFW runs get three extra beta columns.
pub fn export_convergence_report(report: &AssignmentReport, writer: &mut dyn Write) -> Result<()> {
    let with_betas = report.convergence.has_betas();
    if with_betas {
        writeln!(writer, "iteration,rgap,alpha,warnings,beta0,beta1,beta2")?;
    } else {
        writeln!(writer, "iteration,rgap,alpha,warnings")?;
    }

    for row in &report.convergence.rows {
        let warnings = escape(&row.warnings.join("; "));
        write!(writer, "{},{},{},{}", row.iteration, format_number(row.rgap), format_number(row.alpha), warnings)?;
        if with_betas {
            let [b0, b1, b2] = row.betas.unwrap_or([Float::NAN; 3]);
            write!(writer, ",{},{},{}", format_number(b0), format_number(b1), format_number(b2))?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// Full report, pretty-printed.
pub fn report_to_json(report: &AssignmentReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

fn format_number(v: Float) -> String {
    if v.is_nan() { String::new() } else { format!("{v}") }
}

/// Quote a CSV field when it contains a separator or quote.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
