//! Final-statistics reporting.

use relux_solver::Reluplex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// `HH:MM:SS` rendering of a millisecond duration.
#[must_use]
pub fn millis_to_hhmmss(milliseconds: u64) -> String {
    let seconds = milliseconds / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;
    format!("{:02}:{:02}:{:02}", hours, minutes % 60, seconds % 60)
}

/// Append one CSV line of final statistics:
/// `name, status, totalMillis, HH:MM:SS, maxStackDepth, visitedStates`.
pub fn append_final_statistics(
    path: &Path,
    solver: &Reluplex,
    total_millis: u64,
) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;

    writeln!(
        file,
        "{}, {}, {}, {}, {}, {}",
        solver.query_name(),
        solver.status().as_str(),
        total_millis,
        millis_to_hhmmss(total_millis),
        solver.stats().max_stack_depth,
        solver.stats().stack_visited_states
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_to_hhmmss() {
        assert_eq!(millis_to_hhmmss(0), "00:00:00");
        assert_eq!(millis_to_hhmmss(999), "00:00:00");
        assert_eq!(millis_to_hhmmss(61_000), "00:01:01");
        assert_eq!(millis_to_hhmmss(3_661_000), "01:01:01");
        assert_eq!(millis_to_hhmmss(90_000_000), "25:00:00");
    }

    #[test]
    fn test_append_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");

        let mut solver = Reluplex::new(1);
        solver.set_query_name("tiny");
        append_final_statistics(&path, &solver, 1500).unwrap();
        append_final_statistics(&path, &solver, 2500).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("tiny, TIMEOUT, 1500, 00:00:01,"));
    }
}
