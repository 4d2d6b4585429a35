//! Scripted allocation workloads
//!
//! One step per line:
//!
//! ```text
//! # comment
//! alloc p1 256
//! free p1
//! ```

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A single workload step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Allocate `size` bytes and bind the handle to `name`.
    Alloc {
        /// Handle name
        name: String,
        /// Requested payload size
        size: u64,
    },
    /// Free the handle bound to `name`.
    Free {
        /// Handle name
        name: String,
    },
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Alloc { name, size } => write!(f, "alloc {name} {size}"),
            Step::Free { name } => write!(f, "free {name}"),
        }
    }
}

/// Errors raised while parsing or checking a workload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkloadError {
    /// Line could not be parsed
    #[error("line {line}: {reason}")]
    Parse {
        /// 1-based line number
        line: usize,
        /// What was wrong
        reason: String,
    },

    /// `free` names a handle that is not live
    #[error("line {line}: free of unknown handle '{name}'")]
    UnknownHandle {
        /// 1-based line number
        line: usize,
        /// Offending handle name
        name: String,
    },

    /// `alloc` rebinds a handle that is still live
    #[error("line {line}: handle '{name}' is already live")]
    DuplicateHandle {
        /// 1-based line number
        line: usize,
        /// Offending handle name
        name: String,
    },
}

/// Ordered list of allocation steps
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Workload {
    steps: Vec<Step>,
}

impl Workload {
    /// Build a workload from steps, checking handle usage.
    pub fn new(steps: Vec<Step>) -> Result<Self, WorkloadError> {
        let workload = Self { steps };
        workload.check_handles()?;
        Ok(workload)
    }

    /// The reference scenario: three allocations, a free, and a reuse.
    pub fn demo() -> Self {
        let alloc = |name: &str, size| Step::Alloc {
            name: name.to_string(),
            size,
        };
        Self {
            steps: vec![
                alloc("p1", 256),
                alloc("p2", 128),
                alloc("p3", 512),
                Step::Free {
                    name: "p2".to_string(),
                },
                alloc("p4", 128),
            ],
        }
    }

    /// Steps in execution order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the workload has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn check_handles(&self) -> Result<(), WorkloadError> {
        let mut live = HashSet::new();
        for (idx, step) in self.steps.iter().enumerate() {
            let line = idx + 1;
            match step {
                Step::Alloc { name, .. } => {
                    if !live.insert(name.as_str()) {
                        return Err(WorkloadError::DuplicateHandle {
                            line,
                            name: name.clone(),
                        });
                    }
                }
                Step::Free { name } => {
                    if !live.remove(name.as_str()) {
                        return Err(WorkloadError::UnknownHandle {
                            line,
                            name: name.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

impl FromStr for Workload {
    type Err = WorkloadError;

    fn from_str(script: &str) -> Result<Self, Self::Err> {
        let mut steps = Vec::new();
        let mut lines = Vec::new();

        for (idx, raw) in script.lines().enumerate() {
            let line = idx + 1;
            let content = raw.split('#').next().unwrap_or("").trim();
            if content.is_empty() {
                continue;
            }
            steps.push(parse_step(content).map_err(|reason| WorkloadError::Parse { line, reason })?);
            lines.push(line);
        }

        // Report handle errors against script line numbers, not step indices.
        Workload::new(steps).map_err(|err| match err {
            WorkloadError::UnknownHandle { line, name } => WorkloadError::UnknownHandle {
                line: lines[line - 1],
                name,
            },
            WorkloadError::DuplicateHandle { line, name } => WorkloadError::DuplicateHandle {
                line: lines[line - 1],
                name,
            },
            other => other,
        })
    }
}

fn parse_step(content: &str) -> Result<Step, String> {
    let fields: Vec<&str> = content.split_whitespace().collect();
    match fields.as_slice() {
        ["alloc", name, size] => {
            let size = size
                .parse::<u64>()
                .map_err(|_| format!("invalid size '{size}'"))?;
            Ok(Step::Alloc {
                name: (*name).to_string(),
                size,
            })
        }
        ["free", name] => Ok(Step::Free {
            name: (*name).to_string(),
        }),
        [op, ..] if *op == "alloc" || *op == "free" => {
            Err(format!("wrong number of arguments for '{op}'"))
        }
        [op, ..] => Err(format!("unknown operation '{op}'")),
        [] => Err("empty step".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_script_with_comments() {
        let script = "# warm up\nalloc a 64\n\nalloc b 32 # trailing\nfree a\n";
        let workload: Workload = script.parse().unwrap();
        assert_eq!(workload.len(), 3);
        assert_eq!(workload.steps()[2], Step::Free { name: "a".into() });
    }

    #[test]
    fn demo_round_trips_through_display() {
        let script: String = Workload::demo()
            .steps()
            .iter()
            .map(|s| format!("{s}\n"))
            .collect();
        assert_eq!(script.parse::<Workload>().unwrap(), Workload::demo());
    }

    #[test]
    fn parse_errors_carry_line_numbers() {
        let err = "alloc a 1\nalloc b nope".parse::<Workload>().unwrap_err();
        assert_eq!(
            err,
            WorkloadError::Parse {
                line: 2,
                reason: "invalid size 'nope'".into()
            }
        );

        let err = "\n\nresize a 3".parse::<Workload>().unwrap_err();
        assert!(matches!(err, WorkloadError::Parse { line: 3, .. }));
    }

    #[test]
    fn handle_misuse_is_rejected() {
        let err = "alloc a 1\n# gap\nfree b".parse::<Workload>().unwrap_err();
        assert_eq!(
            err,
            WorkloadError::UnknownHandle {
                line: 3,
                name: "b".into()
            }
        );

        let err = "alloc a 1\nalloc a 2".parse::<Workload>().unwrap_err();
        assert!(matches!(err, WorkloadError::DuplicateHandle { line: 2, .. }));

        assert!("alloc a 1\nfree a\nalloc a 2".parse::<Workload>().is_ok());
    }
}
