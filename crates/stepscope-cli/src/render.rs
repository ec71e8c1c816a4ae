//! Plain-text rendering of step views.

use stepscope::call_tree::CallTreeView;
use stepscope::network::NetworkView;
use stepscope::value::Summary;
use stepscope::{RendererContract, RunError, StepView, Value};

pub fn step(view: &StepView) -> String {
    let autoplay = if view.auto_play { "  [autoplay]" } else { "" };
    let mut lines = vec![format!(
        "Step {}/{}  {}{autoplay}",
        view.step + 1,
        view.total,
        view.caption
    )];

    if let Some(code) = &view.code {
        let lineno = view.lineno.map_or_else(|| "?".to_owned(), |n| n.to_string());
        lines.push(format!("{lineno:>4} | {code}"));
    }
    if let Some(formula) = &view.formula {
        lines.push(format!("  formula: {formula}"));
    }
    if let Some(value) = &view.return_value {
        lines.push(format!("  returned: {value}"));
    }

    if !view.variables.is_empty() {
        lines.push("Variables:".to_owned());
        lines.extend(view.variables.iter().map(|variable| {
            let marker = if variable.changed { '*' } else { ' ' };
            format!(
                "{marker} {} ({}) = {}",
                variable.name,
                variable.tag,
                contract(&variable.view)
            )
        }));
    }

    if !view.stdout.is_empty() {
        lines.push("Output:".to_owned());
        lines.extend(view.stdout.iter().map(|line| format!("  {line}")));
    }

    let mut out = lines.join("\n");
    out.push('\n');
    if let Some(tree) = &view.call_tree {
        out.push_str("Call tree:\n");
        out.push_str(&call_tree(tree));
    }
    for network in &view.networks {
        out.push_str(&self::network(network));
    }
    out
}

pub fn contract(contract: &RendererContract) -> String {
    match contract {
        RendererContract::Array { items, elided } => {
            format!("[{}]{}", join(items), more(*elided))
        }
        RendererContract::Grid {
            rows,
            cols,
            cells,
            elided,
        } => {
            let mut out = format!("{rows}x{cols} grid{}", more(*elided));
            for row in cells {
                out.push_str(&format!("\n      [{}]", join(row)));
            }
            out
        }
        RendererContract::Summary {
            summary,
            shape,
            dtype,
        } => {
            let mut out = summary_text(summary);
            if let Some(shape) = shape {
                out.push_str(&format!(" shape={shape:?}"));
            }
            if let Some(dtype) = dtype.as_deref().filter(|d| !d.is_empty()) {
                out.push(' ');
                out.push_str(dtype);
            }
            out
        }
        RendererContract::Scalar { value, annotation } => match annotation {
            Some(annotation) => format!("{value} ({annotation})"),
            None => value.to_string(),
        },
        RendererContract::Mapping { entries, elided } => {
            let entries: Vec<String> = entries
                .iter()
                .map(|(key, value)| format!("{key}: {value}"))
                .collect();
            format!("{{{}}}{}", entries.join(", "), more(*elided))
        }
        RendererContract::HighDimensional { shape, dtype } => {
            format!("tensor shape={shape:?} {dtype} (not expanded)")
        }
        RendererContract::Opaque { text } => text.clone(),
    }
}

fn summary_text(summary: &Summary) -> String {
    let stat = |value: Option<f64>| value.map_or_else(|| "-".to_owned(), |v| Value::Number(v).to_string());
    format!(
        "size={} min={} max={} mean={} sample=[{}]",
        summary.size,
        stat(summary.min),
        stat(summary.max),
        stat(summary.mean),
        join(&summary.sample)
    )
}

fn join(values: &[Value]) -> String {
    values
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn more(elided: usize) -> String {
    if elided == 0 {
        String::new()
    } else {
        format!(" ... (+{elided} more)")
    }
}

pub fn call_tree(view: &CallTreeView) -> String {
    view.rows
        .iter()
        .map(|row| {
            let indent = "  ".repeat(row.depth + 1);
            let returns = row
                .returns
                .as_deref()
                .map_or_else(String::new, |value| format!(" -> {value}"));
            let active = if row.active { "   <" } else { "" };
            format!("{indent}{}{returns}{active}\n", row.label)
        })
        .collect()
}

pub fn network(view: &NetworkView) -> String {
    let sizes: Vec<String> = view
        .columns
        .iter()
        .map(|column| match column.elided {
            0 => column.size.to_string(),
            elided => format!("{} ({elided} hidden)", column.size),
        })
        .collect();
    let dim = |d: Option<u64>| d.map_or_else(|| "?".to_owned(), |d| d.to_string());
    format!(
        "Neural network: {}\n  columns: {}\n  {} layers, {} neurons drawn, {} edges\n  input: {} -> output: {}\n",
        view.model_name,
        sizes.join(" -> "),
        view.architecture.layers,
        view.neurons.len(),
        view.edges.len(),
        dim(view.architecture.input),
        dim(view.architecture.output)
    )
}

pub fn error_panel(error: &RunError) -> String {
    let mut out = format!("Error: {error}\n");
    if let Some(traceback) = error.traceback() {
        out.push_str(traceback);
        if !traceback.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}
