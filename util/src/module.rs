//! Module interfaces
//!
//! Each cyclic module in `brain_exec` shall implement the items in this
//! module.

// ---------------------------------------------------------------------------
// MODULE STATE
// ---------------------------------------------------------------------------

/// The module's internal state.
///
/// Cyclic modules are driven in two phases by the control loop: `analyze`
/// the latest sensor data, then `apply` the outputs to the hardware. `C` is
/// the per-cycle context handed to the module by the loop.
pub trait State<C> {
    /// An error which can occur during cyclic processing.
    type ProcError;

    /// Analyse the latest inputs and update the module's internal state.
    ///
    /// # Outputs
    /// - On success `Ok(())`.
    /// - On error a `ProcError` instance.
    fn analyze(&mut self, ctx: &C) -> Result<(), Self::ProcError>;

    /// Compute and issue the module's outputs for this cycle.
    ///
    /// # Outputs
    /// - On success `Ok(())`.
    /// - On error a `ProcError` instance.
    fn apply(&mut self, ctx: &C) -> Result<(), Self::ProcError>;
}
