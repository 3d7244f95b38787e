use std::io::{self, Write};

use crate::aggregate::GroupStats;
use crate::domain::SurveyYear;

#[derive(Debug, Clone, Copy)]
pub enum ReportEvent<'a> {
    Year(SurveyYear),
    Group {
        variable: &'a str,
        stats: &'a GroupStats,
    },
    Total {
        variable: &'a str,
        average: f64,
    },
}

pub trait ReportSink {
    fn report(&self, event: ReportEvent<'_>);
}

pub struct NullReport;

impl ReportSink for NullReport {
    fn report(&self, _event: ReportEvent<'_>) {}
}

pub struct ConsoleReport;

impl ReportSink for ConsoleReport {
    fn report(&self, event: ReportEvent<'_>) {
        let mut stdout = io::stdout().lock();
        let _ = stdout.write_all(render_event(event).as_bytes());
    }
}

pub fn render_event(event: ReportEvent<'_>) -> String {
    match event {
        ReportEvent::Year(year) => format!("\n\n{year} {}\n", "—".repeat(60)),
        ReportEvent::Group { variable, stats } => format!(
            "> {}\n   > AVG {}: {}\n   > {} total PEUs\n     > {} HHs have ≤0 {}, ({:.1}%)\n",
            stats.category.to_uppercase(),
            variable.to_uppercase(),
            comma_num(stats.weighted_average, true, None),
            comma_num(stats.total_weight.round(), false, None),
            comma_num(stats.non_positive_weight.round(), false, None),
            variable,
            stats.non_positive_share,
        ),
        ReportEvent::Total { variable, average } => format!(
            "\nTotal average {variable}: {}\n",
            comma_num(average.round(), true, None)
        ),
    }
}

/// Formats a number with thousands separators.
///
/// `decimals` rounds to that many places and keeps them; otherwise dollar
/// amounts are rounded to whole units. Negative dollar amounts render as
/// `$-1,234`.
pub fn comma_num(value: f64, dollars: bool, decimals: Option<usize>) -> String {
    let text = match decimals {
        Some(places) => format!("{value:.places$}"),
        None if dollars => format!("{}", value.round()),
        None => format!("{value}"),
    };
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.as_str()),
    };
    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (digits, None),
    };

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let mut out = String::new();
    if dollars {
        out.push('$');
    }
    let is_zero = whole.chars().all(|ch| ch == '0')
        && fraction.is_none_or(|fraction| fraction.chars().all(|ch| ch == '0'));
    if negative && !is_zero {
        out.push('-');
    }
    out.push_str(&grouped);
    if let Some(fraction) = fraction {
        out.push('.');
        out.push_str(fraction);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_thousands() {
        assert_eq!(comma_num(1_234_567.0, false, None), "1,234,567");
        assert_eq!(comma_num(999.0, false, None), "999");
        assert_eq!(comma_num(1000.0, false, None), "1,000");
    }

    #[test]
    fn dollars_round_to_whole_units() {
        assert_eq!(comma_num(1_234_567.89, true, None), "$1,234,568");
    }

    #[test]
    fn negative_values() {
        assert_eq!(comma_num(-25_000.0, true, None), "$-25,000");
        assert_eq!(comma_num(-0.2, true, None), "$0");
    }

    #[test]
    fn decimals_are_kept() {
        assert_eq!(comma_num(12_345.678, false, Some(1)), "12,345.7");
    }

    #[test]
    fn renders_group_block() {
        let stats = GroupStats {
            category: "Hispanic".to_string(),
            rows: 10,
            total_weight: 12_000.4,
            weighted_average: 150_000.0,
            non_positive_weight: 3_000.0,
            non_positive_share: 25.0,
        };
        let text = render_event(ReportEvent::Group {
            variable: "networth",
            stats: &stats,
        });
        assert_eq!(
            text,
            "> HISPANIC\n   > AVG NETWORTH: $150,000\n   > 12,000 total PEUs\n     > 3,000 HHs have ≤0 networth, (25.0%)\n"
        );
    }
}
