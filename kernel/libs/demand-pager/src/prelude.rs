// SPDX-License-Identifier: MPL-2.0

pub(crate) use alloc::{
    boxed::Box,
    collections::BTreeMap,
    sync::{Arc, Weak},
    vec::Vec,
};
pub(crate) use core::{
    fmt::Debug,
    sync::atomic::{AtomicUsize, Ordering},
};

pub(crate) use log::{debug, trace, warn};
pub(crate) use spin::{Mutex, MutexGuard, RwLock};

pub(crate) use crate::{
    error::{Errno, Error, Result},
    return_errno_with_message,
};
