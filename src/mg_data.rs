//! Transfer data linking a fine level to its coarse level.

use crate::device::{Device, DeviceBuffer};
use crate::vector::Vector;
use crate::LocalInt;

/// Fine↔coarse injection mapping and coarse work vectors.
///
/// Only the coarse problem builder constructs this, from the output of the
/// f2c-operator kernel, so `f2c` is always injective.
pub struct MgData<D: Device> {
    f2c: D::Indices,
    c2f: D::Indices,
    rc: Vector<D>,
    xc: Vector<D>,
    axf: Vector<D>,
    host_f2c: Option<Vec<LocalInt>>,
}

impl<D: Device> MgData<D> {
    pub(crate) fn new(
        f2c: D::Indices,
        c2f: D::Indices,
        rc: Vector<D>,
        xc: Vector<D>,
        axf: Vector<D>,
    ) -> Self {
        Self {
            f2c,
            c2f,
            rc,
            xc,
            axf,
            host_f2c: None,
        }
    }

    /// Fine row index for every coarse row.
    pub fn f2c(&self) -> &D::Indices {
        &self.f2c
    }

    /// Coarse row index for every fine grid point, `UNMAPPED` where none maps.
    pub fn c2f(&self) -> &D::Indices {
        &self.c2f
    }

    pub fn coarse_rows(&self) -> usize {
        self.f2c.len()
    }

    pub fn c2f_len(&self) -> usize {
        self.c2f.len()
    }

    /// Coarse right-hand side.
    pub fn rc(&self) -> &Vector<D> {
        &self.rc
    }

    pub fn rc_mut(&mut self) -> &mut Vector<D> {
        &mut self.rc
    }

    /// Coarse solution (correction).
    pub fn xc(&self) -> &Vector<D> {
        &self.xc
    }

    pub fn xc_mut(&mut self) -> &mut Vector<D> {
        &mut self.xc
    }

    /// Fine residual buffer; device form only exists in reference-check mode.
    pub fn axf(&self) -> &Vector<D> {
        &self.axf
    }

    pub fn axf_mut(&mut self) -> &mut Vector<D> {
        &mut self.axf
    }

    /// Host copy of `f2c`, present after the coarse level was mirrored to host.
    pub fn host_f2c(&self) -> Option<&[LocalInt]> {
        self.host_f2c.as_deref()
    }

    pub(crate) fn set_host_f2c(&mut self, f2c: Vec<LocalInt>) {
        self.host_f2c = Some(f2c);
    }

    /// Split borrow: the three work vectors at once.
    pub(crate) fn vectors_mut(&mut self) -> (&mut Vector<D>, &mut Vector<D>, &mut Vector<D>) {
        (&mut self.rc, &mut self.xc, &mut self.axf)
    }
}
