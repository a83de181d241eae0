//! Holes and rendering targets.
//!
//! A [`Hole`] binds one reactive value to one spot on a rendering target:
//! either the target's text content or one of its named attributes. The
//! templating layer builds holes; the frame scheduler keeps them in sync.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Display};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use crate::error::TargetError;
use crate::reactive::{Observer, Value, ValueKind};

/// Global counter for generating unique hole IDs.
static NEXT_HOLE_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a hole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HoleId(u64);

impl HoleId {
    pub fn new() -> Self {
        Self(NEXT_HOLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for HoleId {
    fn default() -> Self {
        Self::new()
    }
}

/// The two mutations the scheduler performs on a rendering target.
///
/// Values arrive already converted to their string form.
pub trait Target {
    fn set_attribute(&self, name: &str, value: &str) -> Result<(), TargetError>;

    fn set_text(&self, value: &str) -> Result<(), TargetError>;
}

/// Type-erased view of a `Value<T>`.
trait Binding {
    fn kind(&self) -> ValueKind;
    fn render(&self) -> String;
    fn revision(&self) -> u64;
    fn observe(&self, notify: Box<dyn FnMut()>) -> Option<Observer>;
}

impl<T> Binding for Value<T>
where
    T: Clone + Display + 'static,
{
    fn kind(&self) -> ValueKind {
        Value::kind(self)
    }

    fn render(&self) -> String {
        Value::render(self)
    }

    fn revision(&self) -> u64 {
        Value::revision(self)
    }

    fn observe(&self, notify: Box<dyn FnMut()>) -> Option<Observer> {
        Value::observe(self, notify)
    }
}

/// One binding point between a reactive value and a target.
pub struct Hole {
    id: HoleId,
    target: Rc<dyn Target>,
    attribute: Option<String>,
    binding: Box<dyn Binding>,
}

impl Hole {
    /// Bind `value` to the target's text content.
    pub fn text<T>(target: Rc<dyn Target>, value: impl Into<Value<T>>) -> Self
    where
        T: Clone + Display + 'static,
    {
        Self::build(target, None, value.into())
    }

    /// Bind `value` to the target attribute called `name`.
    pub fn attribute<T>(
        target: Rc<dyn Target>,
        name: impl Into<String>,
        value: impl Into<Value<T>>,
    ) -> Self
    where
        T: Clone + Display + 'static,
    {
        Self::build(target, Some(name.into()), value.into())
    }

    fn build<T>(target: Rc<dyn Target>, attribute: Option<String>, value: Value<T>) -> Self
    where
        T: Clone + Display + 'static,
    {
        Self {
            id: HoleId::new(),
            target,
            attribute,
            binding: Box::new(value),
        }
    }

    pub fn id(&self) -> HoleId {
        self.id
    }

    /// The attribute this hole writes, or `None` for text content.
    pub fn attribute_name(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    pub fn kind(&self) -> ValueKind {
        self.binding.kind()
    }

    /// The value's current string form. Never tracked.
    pub fn render(&self) -> String {
        self.binding.render()
    }

    /// Render the current value and write it to the target.
    pub fn apply(&self) -> Result<(), TargetError> {
        self.write(&self.render())
    }

    pub(crate) fn write(&self, rendered: &str) -> Result<(), TargetError> {
        match &self.attribute {
            Some(name) => self.target.set_attribute(name, rendered),
            None => self.target.set_text(rendered),
        }
    }

    /// Moves whenever the bound value commits something new. Call after
    /// [`render`](Self::render) to see the up-to-date revision.
    pub(crate) fn revision(&self) -> u64 {
        self.binding.revision()
    }

    /// Call `notify` whenever the bound value may have changed. `None` when
    /// it can never change.
    pub(crate) fn observe(&self, notify: impl FnMut() + 'static) -> Option<Observer> {
        self.binding.observe(Box::new(notify))
    }
}

impl fmt::Debug for Hole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hole")
            .field("id", &self.id)
            .field("attribute", &self.attribute)
            .field("kind", &self.kind())
            .finish()
    }
}

/// A write received by a [`RecordingTarget`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetWrite {
    Text(String),
    Attribute { name: String, value: String },
}

/// An in-memory target that records every write.
///
/// Useful for headless hosts and tests. A detached target rejects writes
/// with [`TargetError::Detached`].
#[derive(Debug, Default)]
pub struct RecordingTarget {
    writes: RefCell<Vec<TargetWrite>>,
    text: RefCell<String>,
    attributes: RefCell<IndexMap<String, String>>,
    detached: Cell<bool>,
}

impl RecordingTarget {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Every accepted write, oldest first.
    pub fn writes(&self) -> Vec<TargetWrite> {
        self.writes.borrow().clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.borrow().len()
    }

    pub fn text(&self) -> String {
        self.text.borrow().clone()
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.attributes.borrow().get(name).cloned()
    }

    pub fn detach(&self) {
        self.detached.set(true);
    }

    pub fn reattach(&self) {
        self.detached.set(false);
    }

    fn check_attached(&self) -> Result<(), TargetError> {
        if self.detached.get() {
            Err(TargetError::Detached)
        } else {
            Ok(())
        }
    }
}

impl Target for RecordingTarget {
    fn set_attribute(&self, name: &str, value: &str) -> Result<(), TargetError> {
        self.check_attached()?;
        self.attributes
            .borrow_mut()
            .insert(name.to_string(), value.to_string());
        self.writes.borrow_mut().push(TargetWrite::Attribute {
            name: name.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    fn set_text(&self, value: &str) -> Result<(), TargetError> {
        self.check_attached()?;
        *self.text.borrow_mut() = value.to_string();
        self.writes
            .borrow_mut()
            .push(TargetWrite::Text(value.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Memo, Signal};

    #[test]
    fn text_hole_writes_text_content() {
        let target = RecordingTarget::new();
        let count = Signal::new(7);
        let hole = Hole::text(target.clone(), count.clone());

        hole.apply().unwrap();
        count.set(8);
        hole.apply().unwrap();

        assert_eq!(target.text(), "8");
        assert_eq!(
            target.writes(),
            vec![TargetWrite::Text("7".into()), TargetWrite::Text("8".into())]
        );
    }

    #[test]
    fn attribute_hole_writes_named_attribute() {
        let target = RecordingTarget::new();
        let width = Signal::new(120);
        let label = Memo::new({
            let width = width.clone();
            move || format!("{}px", width.get())
        });
        let hole = Hole::attribute(target.clone(), "width", label);

        assert_eq!(hole.attribute_name(), Some("width"));
        assert_eq!(hole.kind(), ValueKind::Signal);

        hole.apply().unwrap();
        assert_eq!(target.attribute("width").as_deref(), Some("120px"));
        assert_eq!(target.text(), "");
    }

    #[test]
    fn detached_target_rejects_writes() {
        let target = RecordingTarget::new();
        let hole = Hole::text(target.clone(), Value::constant("hello"));

        target.detach();
        assert_eq!(hole.apply(), Err(TargetError::Detached));
        assert_eq!(target.write_count(), 0);

        target.reattach();
        assert_eq!(hole.apply(), Ok(()));
        assert_eq!(target.text(), "hello");
    }

    #[test]
    fn constant_hole_has_no_subscription() {
        let target = RecordingTarget::new();
        let hole = Hole::text(target, Value::constant(1));

        assert_eq!(hole.kind(), ValueKind::Plain);
        assert!(hole.observe(|| {}).is_none());
    }

    #[test]
    fn hole_ids_are_unique() {
        let target = RecordingTarget::new();
        let a = Hole::text(target.clone(), Value::constant(1));
        let b = Hole::text(target, Value::constant(1));
        assert_ne!(a.id(), b.id());
    }
}
