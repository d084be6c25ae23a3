//! Line diff rendered as an HTML side-by-side table

use similar::{capture_diff_slices, Algorithm, ChangeTag};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOp<'a> {
    Equal(&'a str),
    Delete(&'a str),
    Insert(&'a str),
}

/// Line-by-line diff of two texts
pub fn diff_lines<'a>(from: &'a str, to: &'a str) -> Vec<DiffOp<'a>> {
    let a: Vec<&str> = from.lines().collect();
    let b: Vec<&str> = to.lines().collect();

    let ops = capture_diff_slices(Algorithm::Myers, &a, &b);
    ops.iter()
        .flat_map(|op| op.iter_changes(&a, &b))
        .map(|change| match change.tag() {
            ChangeTag::Equal => DiffOp::Equal(change.value()),
            ChangeTag::Delete => DiffOp::Delete(change.value()),
            ChangeTag::Insert => DiffOp::Insert(change.value()),
        })
        .collect()
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn cell(class: &str, number: Option<usize>, line: Option<&str>) -> String {
    match (number, line) {
        (Some(n), Some(line)) => format!(
            "<td class=\"diff_{}\">{}</td><td class=\"diff_{}\">{}</td>",
            class,
            n,
            class,
            escape_html(line)
        ),
        _ => "<td></td><td></td>".to_string(),
    }
}

/// Numbered rows of the side-by-side table
#[derive(Default)]
struct Rows {
    rows: Vec<String>,
    left_no: usize,
    right_no: usize,
}

impl Rows {
    fn equal(&mut self, line: &str) {
        self.left_no += 1;
        self.right_no += 1;
        self.rows.push(format!(
            "<tr>{}{}</tr>",
            cell("eq", Some(self.left_no), Some(line)),
            cell("eq", Some(self.right_no), Some(line))
        ));
    }

    /// Pair up a run of deletions with the insertions that replaced it
    fn changed(&mut self, deleted: &mut Vec<&str>, inserted: &mut Vec<&str>) {
        for k in 0..deleted.len().max(inserted.len()) {
            let left = deleted.get(k).copied();
            let right = inserted.get(k).copied();
            let left_no = left.map(|_| {
                self.left_no += 1;
                self.left_no
            });
            let right_no = right.map(|_| {
                self.right_no += 1;
                self.right_no
            });
            self.rows.push(format!(
                "<tr>{}{}</tr>",
                cell("sub", left_no, left),
                cell("add", right_no, right)
            ));
        }
        deleted.clear();
        inserted.clear();
    }
}

/// Side-by-side table: `from` on the left, `to` on the right
pub fn html_table(from: &str, to: &str, from_desc: &str, to_desc: &str) -> String {
    let mut rows = Rows::default();
    let mut deleted: Vec<&str> = Vec::new();
    let mut inserted: Vec<&str> = Vec::new();

    for op in diff_lines(from, to) {
        match op {
            DiffOp::Delete(line) => deleted.push(line),
            DiffOp::Insert(line) => inserted.push(line),
            DiffOp::Equal(line) => {
                rows.changed(&mut deleted, &mut inserted);
                rows.equal(line);
            }
        }
    }
    rows.changed(&mut deleted, &mut inserted);

    format!(
        "<table class=\"diff\"><thead><tr><th colspan=\"2\">{}</th><th colspan=\"2\">{}</th></tr></thead><tbody>{}</tbody></table>",
        escape_html(from_desc),
        escape_html(to_desc),
        rows.rows.join("")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_marks_changed_line() {
        let ops = diff_lines("a\nb\nc\n", "a\nx\nc\n");
        assert_eq!(
            ops,
            vec![
                DiffOp::Equal("a"),
                DiffOp::Delete("b"),
                DiffOp::Insert("x"),
                DiffOp::Equal("c"),
            ]
        );
    }

    #[test]
    fn test_diff_of_long_outputs_keeps_common_lines() {
        let from: String = (0..3000).map(|i| format!("{}\n", i)).collect();
        let to = from.replace("1500\n", "x\n");
        let ops = diff_lines(&from, &to);

        let equal = ops.iter().filter(|op| matches!(op, DiffOp::Equal(_))).count();
        assert_eq!(equal, 2999);
        assert!(ops.contains(&DiffOp::Delete("1500")));
        assert!(ops.contains(&DiffOp::Insert("x")));
    }

    #[test]
    fn test_diff_of_empty_texts() {
        assert!(diff_lines("", "").is_empty());
        assert_eq!(diff_lines("", "new"), vec![DiffOp::Insert("new")]);
    }

    #[test]
    fn test_html_table_escapes_content() {
        let html = html_table("<b>\n", "&\n", "Your stdout", "Expected stdout");
        assert!(html.contains("&lt;b&gt;"));
        assert!(html.contains("&amp;"));
        assert!(html.contains("Expected stdout"));
        assert!(html.contains("diff_sub"));
        assert!(html.contains("diff_add"));
    }
}
