// Pass planning - expands a wipe method into the ordered work it implies.
//
// Planning is pure: it never touches the target and never performs I/O, so
// the same method always expands to the same pass list.

use crate::{EngineConfig, WipeMethod, WipeOptions};

/// Data source for one overwrite pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    Zero,
    One,
    Random,
    Fixed(&'static [u8]),
}

impl Pattern {
    pub fn describe(&self) -> String {
        match self {
            Pattern::Zero => "0x00".to_string(),
            Pattern::One => "0xFF".to_string(),
            Pattern::Random => "random".to_string(),
            Pattern::Fixed(bytes) => bytes
                .iter()
                .map(|b| format!("0x{:02X}", b))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// One full overwrite sweep of the target with one pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pass {
    pub index: usize,
    pub total: usize,
    pub pattern: Pattern,
    pub block_size: usize,
}

/// How the planned passes are driven against the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    /// One writer sweeps the whole target, pass after pass.
    Sequential,
    /// Each pass is split into disjoint chunks written concurrently.
    Chunked { workers: usize },
    /// The whole job is handed to an external secure-erase process.
    Delegated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassPlan {
    pub passes: Vec<Pass>,
    pub execution: Execution,
    /// Logical pass count reported to the caller. Differs from
    /// `passes.len()` only for delegated methods, where the external tool
    /// runs its own sweep sequence.
    pub pass_count: usize,
}

// Block sizes tuned per method: big sequential blocks for plain fills,
// smaller ones where the fill itself costs CPU.
const ZEROS_BLOCK: usize = 64 * 1024 * 1024;
const RANDOM_BLOCK: usize = 32 * 1024 * 1024;
const DOD_BLOCK: usize = 1024 * 1024;
const CHUNK_BLOCK: usize = 64 * 1024 * 1024;

/// Passes the external Gutmann tool performs (`shred -n 35 -z` adds a final
/// zero pass on top of the 35 random/patterned ones; the 35 is what the
/// method promises).
pub const GUTMANN_PASSES: usize = 35;

pub fn plan_passes(method: &WipeMethod, options: &WipeOptions, config: &EngineConfig) -> PassPlan {
    match method {
        WipeMethod::Zeros => {
            let n = options.passes.unwrap_or(config.default_passes).max(1) as usize;
            PassPlan {
                passes: repeated(Pattern::Zero, n, ZEROS_BLOCK),
                execution: Execution::Sequential,
                pass_count: n,
            }
        }
        WipeMethod::Random => {
            let n = options.passes.unwrap_or(config.default_passes).max(1) as usize;
            PassPlan {
                passes: repeated(Pattern::Random, n, RANDOM_BLOCK),
                execution: Execution::Sequential,
                pass_count: n,
            }
        }
        WipeMethod::DoD5220 => {
            // The fixed substitution order is the standard's defining
            // property; never reorder these.
            let patterns = [Pattern::Zero, Pattern::One, Pattern::Random];
            let passes = patterns
                .into_iter()
                .enumerate()
                .map(|(index, pattern)| Pass {
                    index,
                    total: 3,
                    pattern,
                    block_size: DOD_BLOCK,
                })
                .collect();
            PassPlan {
                passes,
                execution: Execution::Sequential,
                pass_count: 3,
            }
        }
        WipeMethod::Gutmann => PassPlan {
            passes: vec![Pass {
                index: 0,
                total: 1,
                pattern: Pattern::Random,
                block_size: DOD_BLOCK,
            }],
            execution: Execution::Delegated,
            pass_count: GUTMANN_PASSES,
        },
        WipeMethod::ParallelRandom { workers } => PassPlan {
            passes: vec![Pass {
                index: 0,
                total: 1,
                pattern: Pattern::Random,
                block_size: CHUNK_BLOCK,
            }],
            execution: Execution::Chunked {
                workers: (*workers).max(1),
            },
            pass_count: 1,
        },
        WipeMethod::Lightning => PassPlan {
            passes: vec![Pass {
                index: 0,
                total: 1,
                pattern: Pattern::Zero,
                block_size: config.lightning_buffer,
            }],
            execution: Execution::Sequential,
            pass_count: 1,
        },
    }
}

fn repeated(pattern: Pattern, count: usize, block_size: usize) -> Vec<Pass> {
    (0..count)
        .map(|index| Pass {
            index,
            total: count,
            pattern: pattern.clone(),
            block_size,
        })
        .collect()
}
