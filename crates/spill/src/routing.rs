use vessel_common::Role;
use vessel_ledger::{LedgerError, SubstanceLedger, discard, transfer};

/// What a transfer particle collided with.
#[derive(Debug)]
pub enum HitTarget<'a> {
    /// Another container: the liquid lands in its ledger.
    Container(&'a mut SubstanceLedger),
    /// Floor, walls, players: the liquid leaves the simulation.
    Surface,
}

/// Where the moles of a batch of particle hits ended up.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpillTally {
    pub transferred: f32,
    pub discarded: f32,
}

impl SpillTally {
    pub fn total(&self) -> f32 {
        self.transferred + self.discarded
    }
}

/// Route `hits` particle collisions against one target.
///
/// Each hit carries `particle_moles`. The whole batch runs as a single
/// transfer or discard, so the ledgers notify once per call rather than once
/// per particle. Hits after the source runs dry move nothing.
pub fn route_particle_hits(
    role: Role,
    source: &mut SubstanceLedger,
    target: HitTarget<'_>,
    hits: usize,
    particle_moles: f32,
) -> Result<SpillTally, LedgerError> {
    if hits == 0 {
        return Ok(SpillTally::default());
    }
    let amount = hits as f32 * particle_moles;
    let tally = match target {
        HitTarget::Container(destination) => SpillTally {
            transferred: transfer(role, source, destination, amount)?,
            discarded: 0.0,
        },
        HitTarget::Surface => SpillTally {
            transferred: 0.0,
            discarded: discard(role, source, amount)?,
        },
    };
    tracing::trace!(
        ledger = %source.id(),
        hits,
        transferred = tally.transferred,
        discarded = tally.discarded,
        "routed particle hits"
    );
    Ok(tally)
}
