//! Progress reporting for long-running flash operations

/// Receives progress updates from erase/program/read loops
pub trait Progress {
    /// A new phase starts with `total` units of work (bytes)
    fn phase(&mut self, name: &str, total: usize);

    /// `done` units of the current phase have completed
    fn advance(&mut self, done: usize);

    /// The operation finished
    fn finish(&mut self);
}

/// A no-op progress reporter
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn phase(&mut self, _name: &str, _total: usize) {}
    fn advance(&mut self, _done: usize) {}
    fn finish(&mut self) {}
}

impl<P: Progress + ?Sized> Progress for &mut P {
    fn phase(&mut self, name: &str, total: usize) {
        (**self).phase(name, total)
    }

    fn advance(&mut self, done: usize) {
        (**self).advance(done)
    }

    fn finish(&mut self) {
        (**self).finish()
    }
}
