//! Observer registration for pipeline notifications
//!
//! Each connected handler runs exactly once per emission, in the order it was
//! connected.

use std::fmt;

/// Handle returned by `Signal::connect`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// A list of callbacks for one kind of event
pub struct Signal<T> {
    handlers: Vec<(HandlerId, Box<dyn FnMut(&T)>)>,
    next_id: u64,
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            next_id: 0,
        }
    }

    /// Register `handler`; it runs after every handler connected before it
    pub fn connect<F>(&mut self, handler: F) -> HandlerId
    where
        F: FnMut(&T) + 'static,
    {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, Box::new(handler)));
        id
    }

    /// Remove a handler; returns false if it was not connected
    pub fn disconnect(&mut self, id: HandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(handler_id, _)| *handler_id != id);
        self.handlers.len() != before
    }

    pub fn emit(&mut self, value: &T) {
        for (_, handler) in self.handlers.iter_mut() {
            handler(value);
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Raw (unstyled) HTML of an applied render
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewUpdated {
    pub html: String,
    pub generation: u64,
    pub line_offset: usize,
}

/// A render that could not be displayed
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewFailed {
    pub message: String,
    pub generation: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_emit_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut signal = Signal::<u32>::new();

        for name in ["first", "second", "third"] {
            let log = log.clone();
            signal.connect(move |value| log.borrow_mut().push(format!("{}:{}", name, value)));
        }
        signal.emit(&7);

        assert_eq!(*log.borrow(), vec!["first:7", "second:7", "third:7"]);
    }

    #[test]
    fn test_disconnect() {
        let count = Rc::new(RefCell::new(0));
        let mut signal = Signal::<()>::new();

        let counter = count.clone();
        let id = signal.connect(move |_| *counter.borrow_mut() += 1);
        signal.emit(&());
        assert!(signal.disconnect(id));
        assert!(!signal.disconnect(id));
        signal.emit(&());

        assert_eq!(*count.borrow(), 1);
        assert_eq!(signal.handler_count(), 0);
    }
}
