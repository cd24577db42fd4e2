//! Fixed-length vectors with optional device and host storage.

use crate::device::{Device, DeviceBuffer};
use crate::error::{MgError, Result};

/// A numeric vector whose length is fixed at creation.
///
/// Storage is materialized lazily: a vector may hold a device buffer, a host
/// buffer, both, or neither yet (a deferred vector whose length is known but
/// which has not been allocated anywhere).
pub struct Vector<D: Device> {
    len: usize,
    device: Option<D::Values>,
    host: Option<Vec<f64>>,
}

impl<D: Device> Vector<D> {
    /// Allocate a zeroed device-resident vector.
    pub fn on_device(device: &D, len: usize) -> Result<Self> {
        Ok(Self {
            len,
            device: Some(device.alloc_values(len)?),
            host: None,
        })
    }

    /// Upload `data` into a new device-resident vector.
    pub fn from_host(device: &D, data: &[f64]) -> Result<Self> {
        Ok(Self {
            len: data.len(),
            device: Some(device.upload_values(data)?),
            host: None,
        })
    }

    /// A vector of known length with no storage yet.
    pub fn deferred(len: usize) -> Self {
        Self {
            len,
            device: None,
            host: None,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_on_device(&self) -> bool {
        self.device.is_some()
    }

    pub fn device_values(&self) -> Option<&D::Values> {
        self.device.as_ref()
    }

    pub fn device_values_mut(&mut self) -> Option<&mut D::Values> {
        self.device.as_mut()
    }

    pub fn host_values(&self) -> Option<&[f64]> {
        self.host.as_deref()
    }

    pub fn host_values_mut(&mut self) -> Option<&mut [f64]> {
        self.host.as_deref_mut()
    }

    /// Allocate a zeroed host form if none exists yet.
    pub fn init_host(&mut self) {
        if self.host.is_none() {
            self.host = Some(vec![0.0; self.len]);
        }
    }

    /// Overwrite the device form with `data`.
    pub fn upload(&mut self, device: &D, data: &[f64]) -> Result<()> {
        if data.len() != self.len {
            return Err(MgError::Precondition(format!(
                "upload of {} values into a vector of length {}",
                data.len(),
                self.len
            )));
        }
        match self.device.as_mut() {
            Some(buf) => device.write_values(data, buf),
            None => {
                self.device = Some(device.upload_values(data)?);
                Ok(())
            }
        }
    }

    /// Read the device form back into the host form.
    pub fn copy_to_host(&mut self, device: &D) -> Result<&[f64]> {
        let buf = self.device.as_ref().ok_or_else(|| {
            MgError::Precondition("vector has no device storage to copy from".into())
        })?;
        debug_assert_eq!(buf.len(), self.len);
        let values = device.download_values(buf)?;
        Ok(self.host.insert(values).as_slice())
    }

    /// Download the device form without touching the host form.
    pub fn to_vec(&self, device: &D) -> Result<Vec<f64>> {
        let buf = self.device.as_ref().ok_or_else(|| {
            MgError::Precondition("vector has no device storage to read".into())
        })?;
        device.download_values(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HostDevice;

    #[test]
    fn deferred_vector_has_no_storage() {
        let mut v: Vector<HostDevice> = Vector::deferred(4);
        assert_eq!(v.len(), 4);
        assert!(!v.is_on_device());
        assert!(v.host_values().is_none());
        v.init_host();
        assert_eq!(v.host_values(), Some(&[0.0; 4][..]));
    }

    #[test]
    fn upload_then_copy_to_host() {
        let dev = HostDevice::new();
        let mut v = Vector::on_device(&dev, 3).unwrap();
        v.upload(&dev, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(v.copy_to_host(&dev).unwrap(), &[1.0, 2.0, 3.0]);
        assert_eq!(v.host_values(), Some(&[1.0, 2.0, 3.0][..]));
    }

    #[test]
    fn host_edits_leave_the_device_form_alone() {
        let dev = HostDevice::new();
        let mut v = Vector::from_host(&dev, &[1.0, 2.0]).unwrap();
        v.copy_to_host(&dev).unwrap();
        v.host_values_mut().unwrap()[0] = 5.0;
        assert_eq!(v.host_values(), Some(&[5.0, 2.0][..]));
        assert_eq!(v.to_vec(&dev).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn upload_with_wrong_length_fails() {
        let dev = HostDevice::new();
        let mut v = Vector::on_device(&dev, 3).unwrap();
        assert!(matches!(
            v.upload(&dev, &[1.0]),
            Err(MgError::Precondition(_))
        ));
    }

    #[test]
    fn copy_to_host_without_device_form_fails() {
        let dev = HostDevice::new();
        let mut v: Vector<HostDevice> = Vector::deferred(2);
        assert!(v.copy_to_host(&dev).is_err());
    }
}
