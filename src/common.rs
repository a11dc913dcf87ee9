// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use log::warn;

/// Returns the host name of this machine, used as the default unique
/// designation of our location reports.
#[cfg(unix)]
pub fn hostname() -> String {
    let mut buf = [0u8; 256];
    let err = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if err != 0 {
        warn!(
            "unable to read host name: {}",
            std::io::Error::last_os_error()
        );
        return String::from("unknown");
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..len]).into_owned()
}

#[cfg(not(unix))]
pub fn hostname() -> String {
    std::env::var("COMPUTERNAME").unwrap_or_else(|_| String::from("unknown"))
}
