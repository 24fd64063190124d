use std::any::Any;
use std::cell::RefCell;
use std::thread::LocalKey;

/// A container for type-erased scratch data.
///
/// Element assemblers keep their intermediate buffers in a `Workspace` so
/// that repeated invocations can reuse allocations. Lookup is optimized for
/// the common case of accessing the same type many times in a row.
#[derive(Debug, Default)]
pub struct Workspace {
    entries: Vec<Box<dyn Any>>,
}

impl Workspace {
    pub fn get_or_insert_with<W, F>(&mut self, create: F) -> &mut W
    where
        W: 'static,
        F: FnOnce() -> W,
    {
        // The entries are kept as a stack with the most recently used entry
        // last, so the next lookup of the same type succeeds on the first
        // probe of the reverse search.
        let found = self.entries.iter().rposition(|entry| entry.is::<W>());
        let index = match found {
            Some(index) => index,
            None => {
                self.entries.push(Box::new(create()) as Box<dyn Any>);
                self.entries.len() - 1
            }
        };
        let last = self.entries.len() - 1;
        self.entries.swap(index, last);
        self.entries[last]
            .downcast_mut()
            .expect("Internal error: entry was just checked to have type W")
    }

    pub fn get_or_default<W>(&mut self) -> &mut W
    where
        W: 'static + Default,
    {
        self.get_or_insert_with(Default::default)
    }
}

/// Declares a thread-local [`Workspace`] variable with the given name.
macro_rules! define_thread_local_workspace {
    ($vis:vis $name:ident) => {
        std::thread_local! {
            $vis static $name: std::cell::RefCell<$crate::workspace::Workspace> =
                std::cell::RefCell::new($crate::workspace::Workspace::default());
        }
    };
}

pub(crate) use define_thread_local_workspace;

/// Runs the closure with the typed workspace stored in the given thread-local
/// workspace variable, creating it with `Default` on first use.
pub fn with_thread_local_workspace<W: 'static + Default, R>(
    workspace: &'static LocalKey<RefCell<Workspace>>,
    f: impl FnOnce(&mut W) -> R,
) -> R {
    workspace.with(|ws| {
        let mut ws = ws.borrow_mut();
        f(ws.get_or_default())
    })
}
