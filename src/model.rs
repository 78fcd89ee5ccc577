//! Model trait - explicit registration surface for persisted types.
//!
//! A type opts into persistence by implementing [`Model`]: a stable
//! fully-qualified name, the ordered field shape, extraction of one row's
//! worth of values, and reconstruction from an assembled row. The field set is
//! declared in code, so it is compile-time-checked rather than introspected
//! from runtime metadata.
//!
//! Field declaration order is significant: it drives column order, and
//! `to_values` / `from_row` must walk fields in exactly that order.

use std::any::Any;
use std::collections::VecDeque;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::codec::BlobCodec;
use crate::schema::table::{Row, TableMap};
use crate::value::{Primitive, Value};
use crate::{Error, Result};

/// Declared element type of an opaque container column.
///
/// Only primitive-valued containers are supported; a custom element type is
/// rejected during disassembly.
#[derive(Debug, Clone, Copy)]
pub enum ElementType {
    Primitive(Primitive),
    Custom(&'static str),
}

/// One alternative of a union-typed field.
#[derive(Debug, Clone, Copy)]
pub enum UnionAlt {
    /// Illegal alongside shapes - kept representable so disassembly can
    /// reject it with a precise error
    Primitive(Primitive),
    Shape(TypeShape),
}

/// Declared kind of a single field.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Primitive(Primitive),
    OptionalPrimitive(Primitive),
    /// Homogeneous container stored as one opaque blob
    Container(ElementType),
    OptionalContainer(ElementType),
    /// Nested registered type; the column stores the dynamic type tag
    Reference(TypeShape),
    OptionalReference(TypeShape),
    /// Union of registered types; the column stores the concrete type's tag
    MultiReference(Vec<UnionAlt>),
}

impl FieldKind {
    /// True if the column holds a dynamic type tag instead of data
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            FieldKind::Reference(_) | FieldKind::OptionalReference(_) | FieldKind::MultiReference(_)
        )
    }

    /// True if NULL is a legal cell value for this field
    pub fn is_nullable(&self) -> bool {
        matches!(
            self,
            FieldKind::OptionalPrimitive(_)
                | FieldKind::OptionalContainer(_)
                | FieldKind::OptionalReference(_)
        )
    }
}

/// A single declared field: name plus kind, in declaration order.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldDef {
    pub fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

/// Erased batch assembler, monomorphized per model type by [`shape_of`]
pub(crate) type AssembleFn =
    fn(&TableMap, &dyn BlobCodec, Vec<Row>) -> Result<Vec<Box<dyn Any>>>;

/// Static descriptor handle for a registered type.
///
/// Carries everything the engine needs to recurse into the type without
/// knowing it at compile time: its tag, its field shape, and an erased
/// assembly entry point.
#[derive(Clone, Copy)]
pub struct TypeShape {
    pub name: &'static str,
    pub fields: fn() -> Vec<FieldDef>,
    pub(crate) assemble: AssembleFn,
}

impl std::fmt::Debug for TypeShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeShape").field("name", &self.name).finish()
    }
}

impl PartialEq for TypeShape {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for TypeShape {}

/// Build the [`TypeShape`] for a model type
pub fn shape_of<T: Model>() -> TypeShape {
    TypeShape {
        name: T::type_name(),
        fields: T::fields,
        assemble: crate::assembly::assemble_erased::<T>,
    }
}

/// A persisted type.
///
/// Implementations must keep `fields()`, `to_values` and `from_row` in the
/// same field order. Referenced field types need `Clone` because `to_values`
/// hands owned child instances to the insertion pipeline.
pub trait Model: Sized + 'static {
    /// Stable fully-qualified name. Doubles as the table name and as the
    /// dynamic type tag recorded in reference columns, so it must be unique
    /// across all registered types and stable across processes.
    fn type_name() -> &'static str;

    /// Ordered field shape
    fn fields() -> Vec<FieldDef>;

    /// Extract one row's worth of values, in `fields()` order
    fn to_values(&self, codec: &dyn BlobCodec) -> Result<Vec<FieldValue>>;

    /// Rebuild an instance from an assembled row. Children referenced by the
    /// row are already assembled and waiting in the reader.
    fn from_row(reader: &mut RowReader<'_>) -> Result<Self>;

    /// Post-assembly hook for hydration not representable declaratively,
    /// e.g. reopening a resource. Default: nothing.
    fn post_assemble(&mut self) {}
}

/// Object-safe view of a model instance, used by the insertion pipeline to
/// recurse into child values whose concrete type is only known at runtime.
pub trait ErasedModel {
    fn tag(&self) -> &'static str;
    fn values(&self, codec: &dyn BlobCodec) -> Result<Vec<FieldValue>>;
}

impl<T: Model> ErasedModel for T {
    fn tag(&self) -> &'static str {
        T::type_name()
    }

    fn values(&self, codec: &dyn BlobCodec) -> Result<Vec<FieldValue>> {
        self.to_values(codec)
    }
}

/// One extracted field value, produced by [`Model::to_values`].
pub enum FieldValue {
    /// Primitive or already-encoded container cell, written as-is
    Scalar(Value),
    /// Referenced child instance; `None` writes a NULL tag cell
    Child(Option<Box<dyn ErasedModel>>),
}

impl FieldValue {
    /// Required reference field
    pub fn child<M: Model + Clone>(value: &M) -> Self {
        FieldValue::Child(Some(Box::new(value.clone())))
    }

    /// Optional reference field
    pub fn opt_child<M: Model + Clone>(value: &Option<M>) -> Self {
        FieldValue::Child(value.clone().map(|v| Box::new(v) as Box<dyn ErasedModel>))
    }

    /// Union field with an already-erased concrete value
    pub fn union(value: Box<dyn ErasedModel>) -> Self {
        FieldValue::Child(Some(value))
    }

    /// Container field, serialized through the codec
    pub fn container<T: Serialize>(codec: &dyn BlobCodec, value: &T) -> Result<Self> {
        let bytes = codec.encode(&serde_json::to_value(value)?)?;
        Ok(FieldValue::Scalar(Value::Blob(bytes)))
    }

    /// Optional container field
    pub fn opt_container<T: Serialize>(codec: &dyn BlobCodec, value: &Option<T>) -> Result<Self> {
        match value {
            Some(v) => Self::container(codec, v),
            None => Ok(FieldValue::Scalar(Value::Null)),
        }
    }
}

/// An assembled child instance plus the dynamic tag it was stored under.
pub struct AssembledChild {
    pub tag: String,
    instance: Box<dyn Any>,
}

impl AssembledChild {
    pub(crate) fn new(tag: String, instance: Box<dyn Any>) -> Self {
        Self { tag, instance }
    }

    /// Whether the stored concrete type is `T`
    pub fn is<T: Model>(&self) -> bool {
        self.tag == T::type_name()
    }

    /// Recover the concrete instance
    pub fn downcast<T: Model>(self) -> Result<T> {
        if self.tag != T::type_name() {
            return Err(Error::Assembly(format!(
                "expected child of type {}, row holds {}",
                T::type_name(),
                self.tag
            )));
        }
        self.instance
            .downcast::<T>()
            .map(|b| *b)
            .map_err(|_| Error::Assembly(format!("child tagged {} failed to downcast", self.tag)))
    }
}

/// One populated slot of an assembled row
pub(crate) enum Slot {
    Cell(Value),
    Child(Option<AssembledChild>),
}

/// Typed, coercing cursor over one assembled row, consumed field by field by
/// [`Model::from_row`].
///
/// Numeric cells widen or narrow to the requested representation; booleans
/// accept INTEGER cells; a NULL cell read through a non-optional accessor is
/// an assembly error.
pub struct RowReader<'a> {
    slots: VecDeque<Slot>,
    codec: &'a dyn BlobCodec,
}

impl<'a> RowReader<'a> {
    pub(crate) fn new(slots: Vec<Slot>, codec: &'a dyn BlobCodec) -> Self {
        Self {
            slots: slots.into(),
            codec,
        }
    }

    fn next_slot(&mut self) -> Result<Slot> {
        self.slots
            .pop_front()
            .ok_or_else(|| Error::Assembly("row has fewer columns than declared fields".into()))
    }

    fn next_cell(&mut self) -> Result<Value> {
        match self.next_slot()? {
            Slot::Cell(value) => Ok(value),
            Slot::Child(_) => Err(Error::Assembly(
                "declared scalar field maps to a reference column".into(),
            )),
        }
    }

    fn next_child_slot(&mut self) -> Result<Option<AssembledChild>> {
        match self.next_slot()? {
            Slot::Child(child) => Ok(child),
            Slot::Cell(_) => Err(Error::Assembly(
                "declared reference field maps to a scalar column".into(),
            )),
        }
    }

    fn mismatch(expected: &str, got: &Value) -> Error {
        Error::Assembly(format!("expected {} cell, got {}", expected, got.kind_name()))
    }

    pub fn opt_i64(&mut self) -> Result<Option<i64>> {
        match self.next_cell()? {
            Value::Null => Ok(None),
            Value::Int(i) => Ok(Some(i)),
            Value::Bool(b) => Ok(Some(b as i64)),
            other => Err(Self::mismatch("integer", &other)),
        }
    }

    pub fn i64(&mut self) -> Result<i64> {
        self.opt_i64()?
            .ok_or_else(|| Error::Assembly("unexpected NULL in non-optional integer field".into()))
    }

    pub fn opt_f64(&mut self) -> Result<Option<f64>> {
        match self.next_cell()? {
            Value::Null => Ok(None),
            Value::Real(f) => Ok(Some(f)),
            // INTEGER affinity can hand back whole numbers
            Value::Int(i) => Ok(Some(i as f64)),
            other => Err(Self::mismatch("real", &other)),
        }
    }

    pub fn f64(&mut self) -> Result<f64> {
        self.opt_f64()?
            .ok_or_else(|| Error::Assembly("unexpected NULL in non-optional real field".into()))
    }

    pub fn opt_bool(&mut self) -> Result<Option<bool>> {
        match self.next_cell()? {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(b)),
            Value::Int(i) => Ok(Some(i != 0)),
            other => Err(Self::mismatch("boolean", &other)),
        }
    }

    pub fn bool(&mut self) -> Result<bool> {
        self.opt_bool()?
            .ok_or_else(|| Error::Assembly("unexpected NULL in non-optional boolean field".into()))
    }

    pub fn opt_text(&mut self) -> Result<Option<String>> {
        match self.next_cell()? {
            Value::Null => Ok(None),
            Value::Text(t) => Ok(Some(t)),
            other => Err(Self::mismatch("text", &other)),
        }
    }

    pub fn text(&mut self) -> Result<String> {
        self.opt_text()?
            .ok_or_else(|| Error::Assembly("unexpected NULL in non-optional text field".into()))
    }

    pub fn opt_bytes(&mut self) -> Result<Option<Vec<u8>>> {
        match self.next_cell()? {
            Value::Null => Ok(None),
            Value::Blob(b) => Ok(Some(b)),
            other => Err(Self::mismatch("blob", &other)),
        }
    }

    pub fn bytes(&mut self) -> Result<Vec<u8>> {
        self.opt_bytes()?
            .ok_or_else(|| Error::Assembly("unexpected NULL in non-optional bytes field".into()))
    }

    pub fn opt_container<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        match self.next_cell()? {
            Value::Null => Ok(None),
            Value::Blob(b) => {
                let value = self.codec.decode(&b)?;
                Ok(Some(serde_json::from_value(value)?))
            }
            other => Err(Self::mismatch("blob", &other)),
        }
    }

    pub fn container<T: DeserializeOwned>(&mut self) -> Result<T> {
        self.opt_container()?
            .ok_or_else(|| Error::Assembly("unexpected NULL in non-optional container field".into()))
    }

    pub fn opt_child<T: Model>(&mut self) -> Result<Option<T>> {
        match self.next_child_slot()? {
            Some(child) => Ok(Some(child.downcast()?)),
            None => Ok(None),
        }
    }

    pub fn child<T: Model>(&mut self) -> Result<T> {
        self.opt_child()?
            .ok_or_else(|| Error::Assembly("unexpected NULL in non-optional reference field".into()))
    }

    /// Union field: hand back the tagged child for the caller to match on
    pub fn opt_union(&mut self) -> Result<Option<AssembledChild>> {
        self.next_child_slot()
    }

    pub fn union(&mut self) -> Result<AssembledChild> {
        self.opt_union()?
            .ok_or_else(|| Error::Assembly("unexpected NULL in non-optional union field".into()))
    }
}
