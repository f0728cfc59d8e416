// SPDX-License-Identifier: MPL-2.0

use alloc::collections::TryReserveError;
use core::fmt;

/// Error number.
///
/// Only the codes that this crate can produce are listed. The values match
/// the Linux error numbers so that a host kernel can forward them unchanged.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Errno {
    ENXIO = 6,   /* No such device or address */
    EAGAIN = 11, /* Try again */
    ENOMEM = 12, /* Out of memory */
    EFAULT = 14, /* Bad address */
    EBUSY = 16,  /* Device or resource busy */
    EINVAL = 22, /* Invalid argument */
}

/// The error type used in this crate.
#[derive(Debug, Clone, Copy)]
pub struct Error {
    errno: Errno,
    msg: Option<&'static str>,
}

impl Error {
    pub const fn new(errno: Errno) -> Self {
        Error { errno, msg: None }
    }

    pub const fn with_message(errno: Errno, msg: &'static str) -> Self {
        Error {
            errno,
            msg: Some(msg),
        }
    }

    pub const fn error(&self) -> Errno {
        self.errno
    }

    pub const fn message(&self) -> Option<&'static str> {
        self.msg
    }
}

impl From<Errno> for Error {
    fn from(errno: Errno) -> Self {
        Error::new(errno)
    }
}

impl AsRef<Error> for Error {
    fn as_ref(&self) -> &Error {
        self
    }
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Error::with_message(Errno::ENOMEM, "cannot allocate memory for the store")
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.msg {
            Some(msg) => write!(f, "{:?}: {}", self.errno, msg),
            None => write!(f, "{:?}", self.errno),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;

#[macro_export]
macro_rules! return_errno_with_message {
    ($errno: expr, $message: expr) => {
        return Err($crate::Error::with_message($errno, $message))
    };
}

#[cfg(test)]
mod test {
    use alloc::{format, vec::Vec};

    use super::*;

    #[test]
    fn errno_values_match_linux() {
        assert_eq!(Errno::ENXIO as i32, 6);
        assert_eq!(Errno::EAGAIN as i32, 11);
        assert_eq!(Errno::ENOMEM as i32, 12);
        assert_eq!(Errno::EFAULT as i32, 14);
        assert_eq!(Errno::EBUSY as i32, 16);
        assert_eq!(Errno::EINVAL as i32, 22);
    }

    #[test]
    fn display_includes_message() {
        let err = Error::with_message(Errno::EBUSY, "the store is mapped");
        assert_eq!(format!("{}", err), "EBUSY: the store is mapped");
        assert_eq!(format!("{}", Error::new(Errno::EFAULT)), "EFAULT");
    }

    #[test]
    fn reserve_failure_is_enomem() {
        let mut v: Vec<u8> = Vec::new();
        let err: Error = v.try_reserve(usize::MAX).unwrap_err().into();
        assert_eq!(err.error(), Errno::ENOMEM);
    }
}
