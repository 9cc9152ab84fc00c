use super::window_server::pid_t;
use crate::common::collections::HashMap;

/// Application elements keyed by process id.
///
/// An entry is only valid for the lifetime of that process; callers prune it
/// with [`AppHandleCache::retain_running`] whenever they see the running
/// application list, so a relaunched app with a recycled pid never gets the
/// old element back.
#[derive(Debug)]
pub struct AppHandleCache<H> {
    handles: HashMap<pid_t, H>,
}

impl<H> Default for AppHandleCache<H> {
    fn default() -> Self { Self { handles: HashMap::default() } }
}

impl<H: Clone> AppHandleCache<H> {
    pub fn new() -> Self { Self::default() }

    pub fn get_or_insert_with(&mut self, pid: pid_t, create: impl FnOnce() -> H) -> H {
        self.handles.entry(pid).or_insert_with(create).clone()
    }

    /// Like [`AppHandleCache::get_or_insert_with`], caching nothing on failure.
    pub fn get_or_try_insert_with<E>(
        &mut self,
        pid: pid_t,
        create: impl FnOnce() -> Result<H, E>,
    ) -> Result<H, E> {
        if let Some(handle) = self.handles.get(&pid) {
            return Ok(handle.clone());
        }
        let handle = create()?;
        self.handles.insert(pid, handle.clone());
        Ok(handle)
    }

    pub fn remove(&mut self, pid: pid_t) -> Option<H> { self.handles.remove(&pid) }

    /// Drops every entry whose pid is not in `running`.
    pub fn retain_running(&mut self, running: impl IntoIterator<Item = pid_t>) {
        let running: crate::common::collections::HashSet<pid_t> = running.into_iter().collect();
        self.handles.retain(|pid, _| running.contains(pid));
    }

    pub fn len(&self) -> usize { self.handles.len() }

    pub fn is_empty(&self) -> bool { self.handles.is_empty() }
}
