use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::model::{CallTree, FunctionId};

#[derive(Debug, Error)]
pub enum CollapsedParseError {
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("no valid stack lines found")]
    Empty,
    #[error("line {line}: invalid sample count {count:?}")]
    Count { line: usize, count: String },
}

/// Parse Brendan Gregg's collapsed/folded stack format into a [`CallTree`].
///
/// Each line has the format `frame;frame;... count`, outermost frame first.
/// A frame may name its module as `module`function`. Every counted sample
/// weighs `sample_interval`.
///
/// Used by: `perf script | stackcollapse-perf.pl`, dtrace, FlameGraph tools.
pub fn parse_collapsed(
    data: &[u8],
    sample_interval: Duration,
) -> Result<CallTree, CollapsedParseError> {
    let text = std::str::from_utf8(data)?;
    let mut tree = CallTree::new();
    let mut samples = 0usize;
    let mut stack: Vec<FunctionId> = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // "a;b;c 42"
        let Some((stack_str, count_str)) = line.rsplit_once(char::is_whitespace) else {
            continue;
        };
        let count: u32 = count_str.parse().map_err(|_| CollapsedParseError::Count {
            line: index + 1,
            count: count_str.to_owned(),
        })?;

        stack.clear();
        for frame in stack_str.trim().split(';') {
            let frame = frame.trim();
            if frame.is_empty() {
                continue;
            }
            let id = match frame.split_once('`') {
                Some((module, name)) if !module.is_empty() && !name.is_empty() => {
                    tree.intern_function(name, Some(module))
                }
                _ => tree.intern_function(frame, None),
            };
            stack.push(id);
        }
        if stack.is_empty() {
            continue;
        }

        tree.add_sample(&stack, sample_interval * count);
        samples += 1;
    }

    if samples == 0 {
        return Err(CollapsedParseError::Empty);
    }
    debug!(
        samples,
        nodes = tree.node_count(),
        "parsed collapsed stacks"
    );
    Ok(tree)
}
