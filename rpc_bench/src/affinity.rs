//! CPU pinning for the driver thread.

fn pin_to_core(core_id: usize) -> Result<(), i32> {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(core_id, &mut set);
        let ret = libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set);
        if ret == 0 {
            Ok(())
        } else {
            Err(*libc::__errno_location())
        }
    }
}

/// Pin the current thread if a core was requested. Does nothing if None.
pub fn pin_if_configured(core: Option<usize>) {
    let Some(core_id) = core else {
        return;
    };

    match pin_to_core(core_id) {
        Ok(()) => eprintln!("driver thread pinned to core {}", core_id),
        Err(errno) => eprintln!(
            "failed to pin driver thread to core {} (errno={})",
            core_id, errno
        ),
    }
}
