/// Read a peripheral register twice after clearing an interrupt source.
///
/// The write that clears a flag crosses from the CPU clock domain into the
/// peripheral clock domain and lands a few cycles later. Without the dummy
/// reads a handler can return before the flag is actually low and get
/// re-entered straight away. Pass a register whose reads have no side
/// effects (ARM Application Note 321, section 4.9).
macro_rules! interrupt_clear_clock_sync_delay {
    ($status_reg:expr) => {
        let _ = $status_reg.read();
        let _ = $status_reg.read();
    };
}
