use core::fmt::{self, Write};

use crate::cache::CacheMaintenance;
use crate::smp::SmpContext;

/// Append the SMP block of the system report:
///
/// ```text
/// Max harts:     \t{[0][1][2][3]}
/// Active harts:  \t{[+][+][-][-]}
/// ```
///
/// A hart is active once its slot reads running or finished.
pub fn write_hart_info<W: Write, const N: usize, C: CacheMaintenance>(
    w: &mut W,
    ctx: &SmpContext<N, C>,
) -> fmt::Result {
    w.write_str("Max harts:     \t{")?;
    for idx in 0..N {
        write!(w, "[{}]", idx)?;
    }
    w.write_str("}\n")?;

    w.write_str("Active harts:  \t{")?;
    for slot in ctx.slots() {
        w.write_str(if slot.is_present() { "[+]" } else { "[-]" })?;
    }
    w.write_str("}\n")
}
