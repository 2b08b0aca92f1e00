//! Single-pass dispatch.

use log::trace;

use crate::buffers::BufferPair;
use crate::device::ComputeDevice;
use crate::error::{FailureContext, SortError, SortResult};
use crate::schedule::PassDescriptor;

/// Run `pass` over every element of `pair` and flip the buffer roles.
///
/// Reads the current slot and writes the scratch slot. On failure the pair
/// is left unswapped and the job must be abandoned.
pub async fn execute<D>(
    device: &D,
    pair: &mut BufferPair<D::Buffer>,
    pass: PassDescriptor,
) -> SortResult<()>
where
    D: ComputeDevice + ?Sized,
{
    if !pair.is_uploaded() {
        return Err(SortError::invalid_input(format!(
            "pass {pass} scheduled before the input was uploaded"
        )));
    }

    trace!(
        "dispatch {pass}: {} lanes, slot {} -> slot {}",
        pair.len(),
        pair.current_index(),
        1 - pair.current_index()
    );

    device
        .dispatch_compare_exchange(pair.current(), pair.scratch(), pass, pair.len())
        .await
        .map_err(SortError::kernel(FailureContext::Pass(pass)))?;

    pair.swap();
    Ok(())
}
