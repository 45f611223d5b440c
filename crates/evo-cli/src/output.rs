use serde::Serialize;

/// Widest a single cell renders; longer values (log error lines, marker
/// text) are clipped with an ellipsis so the table stays on one screen.
const MAX_CELL_WIDTH: usize = 60;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    print!("{}", render_table(headers, &rows));
}

fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let clipped: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(|cell| clip(cell)).collect())
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &clipped {
        for (i, cell) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let header_cells: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();

    let mut lines = vec![format_row(&header_cells, &widths), rule.join("  ")];
    for row in &clipped {
        lines.push(format_row(row, &widths));
    }
    lines.join("\n") + "\n"
}

fn format_row(cells: &[String], widths: &[usize]) -> String {
    let mut line = String::new();
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            line.push_str("  ");
        }
        line.push_str(cell);
        let width = widths.get(i).copied().unwrap_or(0);
        for _ in cell.chars().count()..width {
            line.push(' ');
        }
    }
    line.trim_end().to_string()
}

fn clip(cell: &str) -> String {
    if cell.chars().count() <= MAX_CELL_WIDTH {
        return cell.to_string();
    }
    let mut out: String = cell.chars().take(MAX_CELL_WIDTH - 1).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_align_and_rows_have_no_trailing_spaces() {
        let rendered = render_table(
            &["KIND", "SUMMARY"],
            &[
                vec!["bug_fix".to_string(), "ERROR timeout".to_string()],
                vec!["feature".to_string(), "add retry".to_string()],
            ],
        );
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "KIND     SUMMARY");
        assert_eq!(lines[1], "-------  -------------");
        assert_eq!(lines[2], "bug_fix  ERROR timeout");
        assert!(lines.iter().all(|l| !l.ends_with(' ')));
    }

    #[test]
    fn long_cells_are_clipped_with_an_ellipsis() {
        let long = "x".repeat(200);
        let rendered = render_table(&["SUMMARY"], &[vec![long]]);
        let row = rendered.lines().nth(2).unwrap();
        assert_eq!(row.chars().count(), MAX_CELL_WIDTH);
        assert!(row.ends_with('…'));
    }
}
