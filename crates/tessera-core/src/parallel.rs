// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Disjoint-range parallel-for over an output slice.
//!
//! The output is split into contiguous chunks and each worker owns exactly
//! one chunk, so workers never write to the same index and no locking is
//! needed between them. Workers run on scoped threads; a panicking worker
//! re-raises its panic on the caller's thread.

/// Inputs shorter than this run on the caller's thread.
pub const SERIAL_THRESHOLD: usize = 1024;

/// Worker count matching the machine's available parallelism.
#[must_use]
pub fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

/// Runs `f(offset, chunk)` over disjoint contiguous chunks of `output`.
///
/// `offset` is the index of `chunk[0]` within `output`. With one worker, or
/// when `output` is shorter than [`SERIAL_THRESHOLD`], `f` is called once on
/// the whole slice. The first error by chunk order is returned; other chunks
/// still run to completion.
pub fn parallel_for_chunks<T, E, F>(output: &mut [T], workers: usize, f: F) -> Result<(), E>
where
    T: Send,
    E: Send,
    F: Fn(usize, &mut [T]) -> Result<(), E> + Sync,
{
    let workers = workers.max(1);
    if workers == 1 || output.len() < SERIAL_THRESHOLD {
        return f(0, output);
    }
    let chunk_len = output.len().div_ceil(workers);

    std::thread::scope(|s| {
        let f = &f;
        let handles: Vec<_> = output
            .chunks_mut(chunk_len)
            .enumerate()
            .map(|(i, chunk)| s.spawn(move || f(i * chunk_len, chunk)))
            .collect();

        let mut first_err = None;
        for handle in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        first_err.map_or(Ok(()), Err)
    })
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn every_index_written_exactly_once() {
        let mut out = vec![0_u32; 10_000];
        parallel_for_chunks(&mut out, 7, |offset, chunk| {
            for (i, slot) in chunk.iter_mut().enumerate() {
                *slot += (offset + i) as u32;
            }
            Ok::<(), ()>(())
        })
        .unwrap();
        assert!(out.iter().enumerate().all(|(i, v)| *v == i as u32));
    }

    #[test]
    fn small_inputs_run_serially() {
        let mut out = vec![0_u8; 10];
        let calls = std::sync::atomic::AtomicUsize::new(0);
        parallel_for_chunks(&mut out, 8, |offset, chunk| {
            assert_eq!(offset, 0);
            assert_eq!(chunk.len(), 10);
            calls.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            Ok::<(), ()>(())
        })
        .unwrap();
        assert_eq!(calls.into_inner(), 1);
    }

    #[test]
    fn first_error_by_chunk_order_wins() {
        let mut out = vec![0_u8; 4096];
        let err = parallel_for_chunks(&mut out, 4, |offset, _| {
            if offset == 0 {
                Ok(())
            } else {
                Err(offset)
            }
        })
        .unwrap_err();
        assert_eq!(err, 1024);
    }
}
