//! Formatted output helpers for CLI commands.

use krate_common::types::Pid;

/// Joins up to `max` pids with commas, summarizing the rest.
#[must_use]
pub fn format_pids(pids: &[Pid], max: usize) -> String {
    let shown: Vec<String> = pids.iter().take(max).map(ToString::to_string).collect();
    let mut out = shown.join(",");
    if pids.len() > max {
        out.push_str(&format!(" (+{} more)", pids.len() - max));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pids(raw: &[i32]) -> Vec<Pid> {
        raw.iter().copied().map(Pid::from_raw).collect()
    }

    #[test]
    fn format_pids_joins_all_when_short() {
        assert_eq!(format_pids(&pids(&[10, 20, 30]), 8), "10,20,30");
    }

    #[test]
    fn format_pids_summarizes_overflow() {
        assert_eq!(format_pids(&pids(&[1, 2, 3, 4]), 2), "1,2 (+2 more)");
    }

    #[test]
    fn format_pids_of_nothing_is_empty() {
        assert_eq!(format_pids(&[], 4), "");
    }
}
