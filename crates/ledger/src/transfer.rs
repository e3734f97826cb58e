use vessel_common::Role;

use crate::ledger::{LedgerError, SubstanceLedger, share_total, validate_amount};

/// Move up to `amount` moles from `source` into `destination`.
///
/// The source gives up its share proportionally and each share lands in the
/// destination under the same substance. Both ledgers are updated before
/// either raises its notification, so no observer sees quantity in flight.
/// Returns the moles moved; zero when the source is empty.
///
/// The destination accepts everything regardless of capacity. An overfill is
/// logged and left to the caller to detect via `relative_volume`. A
/// destination holding a different definition under one of the source's
/// substance ids rejects the whole transfer before anything moves.
pub fn transfer(
    role: Role,
    source: &mut SubstanceLedger,
    destination: &mut SubstanceLedger,
    amount: f32,
) -> Result<f32, LedgerError> {
    source.check_authority(role, "transfer")?;
    destination.check_authority(role, "transfer")?;
    validate_amount(amount)?;
    for entry in source.entries() {
        destination.check_substance(&entry.substance)?;
    }
    destination.check_headroom(amount.min(source.total_moles()), source.current_volume())?;

    let shares = source.withdraw(amount);
    if shares.is_empty() {
        return Ok(0.0);
    }

    for (substance, moles) in &shares {
        destination.deposit(substance, *moles);
    }
    let moved = share_total(&shares);
    source.commit();
    destination.commit();

    tracing::debug!(
        from = %source.id(),
        to = %destination.id(),
        requested = amount,
        moved,
        "transferred moles"
    );
    if destination.relative_volume() > 1.0 {
        tracing::debug!(
            ledger = %destination.id(),
            relative_volume = destination.relative_volume(),
            "destination over capacity"
        );
    }
    Ok(moved)
}

/// Remove up to `amount` moles from `ledger` with no destination.
///
/// Models spillage onto the environment: the quantity leaves the simulated
/// system, so conservation does not hold across a discard.
pub fn discard(role: Role, ledger: &mut SubstanceLedger, amount: f32) -> Result<f32, LedgerError> {
    let removed = ledger.remove_moles(role, amount)?;
    if removed > 0.0 {
        tracing::debug!(ledger = %ledger.id(), removed, "discarded moles");
    }
    Ok(removed)
}
