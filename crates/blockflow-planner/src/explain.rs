//! Human-readable plan listing.
//!
//! One line per distinct node, inputs first:
//! ```text
//! N0 = Range(0:5)          [integer] rows=5
//! N1 = Append(N0,N0)       [integer] rows=10
//! ```
//! Tags match the stage tags the executor reports.

use std::fmt::Write;

use blockflow_core::dag::{post_order, NodeTagger, PNode};
use blockflow_core::error::Result;
use blockflow_core::schema::format_types;
use blockflow_operators::{Inference, Registry};

pub fn explain(root: &PNode) -> Result<String> {
    let mut inf = Inference::new();
    let mut tagger = NodeTagger::new();
    let nodes = post_order(root);

    let mut lines = Vec::with_capacity(nodes.len());
    for n in &nodes {
        let tag = tagger.tag(n);
        let repr = Registry::repr(n, &mut tagger);
        let types = format_types(&inf.types(n)?);
        let rows = match inf.length(n)? {
            Some(l) => l.to_string(),
            None => "?".to_string(),
        };
        lines.push((format!("{} = {}", tag, repr), types, rows));
    }

    let width = lines.iter().map(|(head, _, _)| head.len()).max().unwrap_or(0);
    let mut out = String::new();
    for (head, types, rows) in lines {
        // Writing to a String cannot fail.
        let _ = writeln!(out, "{:<width$} {} rows={}", head, types, rows, width = width);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Plan;

    #[test]
    fn lists_shared_node_once() {
        let r = Plan::range(0, 5).unwrap();
        let p = r.append(&r).unwrap();
        let text = explain(p.node()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("N0 = Range(0:5)"));
        assert!(lines[0].ends_with("[integer] rows=5"));
        assert!(lines[1].starts_with("N1 = Append(N0,N0)"));
        assert!(lines[1].ends_with("rows=10"));
    }

    #[test]
    fn unknown_length_is_marked() {
        let data = Plan::range(0, 3).unwrap();
        let mask = Plan::constant(1, 3).unwrap();
        let text = explain(data.filter(&mask).unwrap().node()).unwrap();
        assert!(text.lines().last().unwrap().ends_with("rows=?"));
    }

    #[test]
    fn inference_errors_propagate() {
        let p = Plan::range(0, 1)
            .unwrap()
            .append(&Plan::constant("a", 1).unwrap())
            .unwrap();
        assert!(explain(p.node()).is_err());
    }
}
