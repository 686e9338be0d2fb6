// Streaming pattern writer.
//
// Fills a reusable aligned buffer per the pass pattern and writes it block
// by block over the span, flushing each block to stable storage before the
// increment is reported. The cancel signal is honored between blocks; the
// last completed block gets a best-effort flush on the way out.

use super::{ExecContext, PassOutcome, WriteSpan};
use crate::io::{flush_data, open_for_write, write_all_at, AlignedBuffer};
use crate::plan::{Pass, Pattern};
use crate::{WipeError, WipeResult};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

pub fn run_span(span: &WriteSpan, pass: &Pass, ctx: &ExecContext) -> WipeResult<PassOutcome> {
    if span.len == 0 {
        return Ok(PassOutcome::Completed(0));
    }

    let file = open_for_write(&span.path, span.direct)
        .map_err(|e| WipeError::unavailable(&span.path, format!("cannot open for writing: {}", e)))?;

    let block_size = (pass.block_size as u64).min(span.len).max(1) as usize;
    let mut buffer = AlignedBuffer::page_aligned(block_size)
        .map_err(|e| WipeError::unavailable(&span.path, format!("buffer allocation: {}", e)))?;

    // Constant patterns fill the buffer once; random refills every block.
    let mut rng = match pass.pattern {
        Pattern::Zero => {
            buffer.as_mut_slice().fill(0x00);
            None
        }
        Pattern::One => {
            buffer.as_mut_slice().fill(0xFF);
            None
        }
        Pattern::Fixed(_) => None,
        Pattern::Random => Some(StdRng::from_entropy()),
    };

    let mut written = 0u64;
    while written < span.len {
        if ctx.stop_requested() {
            let _ = flush_data(&file);
            return Ok(PassOutcome::Cancelled(written));
        }

        let n = (span.len - written).min(block_size as u64) as usize;
        match &pass.pattern {
            Pattern::Random => {
                rng.as_mut().unwrap().fill_bytes(&mut buffer.as_mut_slice()[..n]);
            }
            Pattern::Fixed(pattern) => {
                // Keep the cyclic pattern phase-continuous across blocks
                let phase = (written % pattern.len() as u64) as usize;
                fill_cyclic(&mut buffer.as_mut_slice()[..n], pattern, phase);
            }
            _ => {}
        }

        let offset = span.offset + written;
        write_all_at(&file, &buffer.as_slice()[..n], offset).map_err(|e| {
            WipeError::WriteFailed {
                path: span.path.clone(),
                offset,
                source: e,
            }
        })?;
        flush_data(&file).map_err(|e| WipeError::WriteFailed {
            path: span.path.clone(),
            offset,
            source: e,
        })?;

        written += n as u64;
        ctx.report(n as u64);
    }

    Ok(PassOutcome::Completed(written))
}

fn fill_cyclic(buf: &mut [u8], pattern: &[u8], phase: usize) {
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte = pattern[(phase + i) % pattern.len()];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cyclic_fill_carries_phase_across_blocks() {
        let pattern: &[u8] = &[0x92, 0x49, 0x24];

        let mut first = [0u8; 4];
        fill_cyclic(&mut first, pattern, 0);
        assert_eq!(first, [0x92, 0x49, 0x24, 0x92]);

        // The next block starts where the previous one left off
        let mut second = [0u8; 4];
        fill_cyclic(&mut second, pattern, 4 % pattern.len());
        assert_eq!(second, [0x49, 0x24, 0x92, 0x49]);
    }
}
