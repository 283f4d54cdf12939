//! Terminal report for a finished benchmark

use colored::Colorize;

use crate::benchmark::{GateCheck, GateResult, RunMetrics, SummaryMetrics};

/// Renders summary metrics and the gate table to stdout
pub struct ReportPresenter<'a> {
    tenant_id: &'a str,
    summary: &'a SummaryMetrics,
    gates: &'a GateResult,
    runs: &'a [RunMetrics],
}

impl<'a> ReportPresenter<'a> {
    pub fn new(tenant_id: &'a str, summary: &'a SummaryMetrics, gates: &'a GateResult, runs: &'a [RunMetrics]) -> Self {
        Self {
            tenant_id,
            summary,
            gates,
            runs,
        }
    }

    pub fn print(&self) {
        println!("{}", self.render());
    }

    pub fn render(&self) -> String {
        let m = &self.summary.metrics;
        let mut out = Vec::new();

        out.push(String::new());
        out.push("╔══════════════════════════════════════════════════════════════╗".to_string());
        out.push(format!("║  CONFIDENCE BENCHMARK: {:<38}║", self.tenant_id));
        out.push("╚══════════════════════════════════════════════════════════════╝".to_string());

        out.push(String::new());
        out.push(format!("{:<8} {:>7} {:>10} {:>9} {:>9} {:>9}", "Run", "Hit %", "Wrong %", "Clarify %", "p50 ms", "p95 ms"));
        out.push("─".repeat(58));
        for run in self.runs {
            out.push(format!(
                "{:<8} {:>7.1} {:>10.1} {:>9.1} {:>9.0} {:>9.0}",
                run.run_number,
                run.hit_rate,
                run.wrong_hit_rate,
                run.edge_clarify_rate,
                run.http_latency.p50,
                run.http_latency.p95
            ));
        }

        out.push(String::new());
        out.push(format!(
            "Cases: {} over {} runs | Selector called: {} ({:.1}%)",
            m.total_cases, m.runs, m.selector_called_cases, m.selector_called_rate
        ));
        out.push(format!(
            "Hit rate: mean {:.1}% (min {:.1}, max {:.1}, spread {:.1} pts)",
            m.hit_rate.mean, m.hit_rate.min, m.hit_rate.max, m.hit_rate.variance
        ));
        out.push(format!(
            "Wrong-hit: mean {:.1}%, worst run {:.1}% | Edge clarify: {:.1}%",
            m.wrong_hit_rate.mean, m.wrong_hit_rate.max, m.edge_clarify_rate.mean
        ));
        out.push(format!(
            "HTTP latency: p50 {:.0}ms, p95 {:.0}ms | Total case: p50 {:.0}ms, p95 {:.0}ms",
            m.http_latency.p50, m.http_latency.p95, m.total_case_latency.p50, m.total_case_latency.p95
        ));
        out.push(format!(
            "Errors: {} non-200, {} client",
            m.non_200_count, m.client_error_count
        ));

        for failure in &self.summary.stage_errors {
            out.push(format!("{} {}: {}", "degraded".yellow(), failure.stage, failure.message));
        }

        out.push(String::new());
        out.push("Gates".bold().to_string());
        for check in &self.gates.checks {
            out.push(gate_line(check));
        }

        out.push(String::new());
        let verdict = if self.gates.all_passed {
            "READY: all gates passed".green().bold()
        } else {
            let failed = self.gates.failed_checks().count();
            format!("NOT READY: {} of {} gates failed", failed, self.gates.checks.len()).as_str().red().bold()
        };
        out.push(verdict.to_string());

        out.join("\n")
    }
}

fn gate_line(check: &GateCheck) -> String {
    let mark = if check.passed { "✓".green() } else { "✗".red() };
    format!(
        "  {} {:<20} {:>9.1}{:<3} {} {:.1}{}",
        mark,
        check.name,
        check.actual,
        check.unit,
        check.comparator.symbol(),
        check.threshold,
        check.unit
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::evaluate;
    use crate::config::GateThresholds;

    #[test]
    fn test_render_lists_every_gate() {
        colored::control::set_override(false);
        let summary = SummaryMetrics::default();
        let gates = evaluate(&summary.metrics, &GateThresholds::default());
        let text = ReportPresenter::new("acme", &summary, &gates, &[]).render();

        for name in ["hit_rate", "wrong_hit_rate", "edge_clarify_rate", "hit_rate_variance", "http_p50", "http_p95"] {
            assert!(text.contains(name), "missing gate {}", name);
        }
        assert!(text.contains("NOT READY: 3 of 6 gates failed"));
        assert!(text.contains("✗ hit_rate"));
        assert!(text.contains("✓ wrong_hit_rate"));
    }
}
