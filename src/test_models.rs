//! Shared model fixtures for the crate's tests.

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::codec::BlobCodec;
use crate::model::{
    ElementType, FieldDef, FieldKind, FieldValue, Model, RowReader, UnionAlt, shape_of,
};
use crate::value::{Primitive, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    pub sku: String,
    pub qty: i64,
}

impl Model for LineItem {
    fn type_name() -> &'static str {
        "odb::test_models::LineItem"
    }

    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::new("sku", FieldKind::Primitive(Primitive::Text)),
            FieldDef::new("qty", FieldKind::Primitive(Primitive::Int)),
        ]
    }

    fn to_values(&self, _codec: &dyn BlobCodec) -> Result<Vec<FieldValue>> {
        Ok(vec![
            FieldValue::Scalar(Value::Text(self.sku.clone())),
            FieldValue::Scalar(Value::Int(self.qty)),
        ])
    }

    fn from_row(r: &mut RowReader<'_>) -> Result<Self> {
        Ok(Self {
            sku: r.text()?,
            qty: r.i64()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: i64,
    pub item: LineItem,
}

impl Model for Order {
    fn type_name() -> &'static str {
        "odb::test_models::Order"
    }

    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::new("id", FieldKind::Primitive(Primitive::Int)),
            FieldDef::new("item", FieldKind::Reference(shape_of::<LineItem>())),
        ]
    }

    fn to_values(&self, _codec: &dyn BlobCodec) -> Result<Vec<FieldValue>> {
        Ok(vec![
            FieldValue::Scalar(Value::Int(self.id)),
            FieldValue::child(&self.item),
        ])
    }

    fn from_row(r: &mut RowReader<'_>) -> Result<Self> {
        Ok(Self {
            id: r.i64()?,
            item: r.child()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub title: String,
    pub body: String,
}

impl Model for Note {
    fn type_name() -> &'static str {
        "odb::test_models::Note"
    }

    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::new("title", FieldKind::Primitive(Primitive::Text)),
            FieldDef::new("body", FieldKind::Primitive(Primitive::Text)),
        ]
    }

    fn to_values(&self, _codec: &dyn BlobCodec) -> Result<Vec<FieldValue>> {
        Ok(vec![
            FieldValue::Scalar(Value::Text(self.title.clone())),
            FieldValue::Scalar(Value::Text(self.body.clone())),
        ])
    }

    fn from_row(r: &mut RowReader<'_>) -> Result<Self> {
        Ok(Self {
            title: r.text()?,
            body: r.text()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub name: String,
    pub width: i64,
}

impl Model for Image {
    fn type_name() -> &'static str {
        "odb::test_models::Image"
    }

    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::new("name", FieldKind::Primitive(Primitive::Text)),
            FieldDef::new("width", FieldKind::Primitive(Primitive::Int)),
        ]
    }

    fn to_values(&self, _codec: &dyn BlobCodec) -> Result<Vec<FieldValue>> {
        Ok(vec![
            FieldValue::Scalar(Value::Text(self.name.clone())),
            FieldValue::Scalar(Value::Int(self.width)),
        ])
    }

    fn from_row(r: &mut RowReader<'_>) -> Result<Self> {
        Ok(Self {
            name: r.text()?,
            width: r.i64()?,
        })
    }
}

/// Union-typed field payload: the concrete variant decides which child table
/// holds the data.
#[derive(Debug, Clone, PartialEq)]
pub enum Attachment {
    Image(Image),
    Note(Note),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub subject: String,
    pub attachment: Attachment,
}

impl Model for Message {
    fn type_name() -> &'static str {
        "odb::test_models::Message"
    }

    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::new("subject", FieldKind::Primitive(Primitive::Text)),
            FieldDef::new(
                "attachment",
                FieldKind::MultiReference(vec![
                    UnionAlt::Shape(shape_of::<Image>()),
                    UnionAlt::Shape(shape_of::<Note>()),
                ]),
            ),
        ]
    }

    fn to_values(&self, _codec: &dyn BlobCodec) -> Result<Vec<FieldValue>> {
        Ok(vec![
            FieldValue::Scalar(Value::Text(self.subject.clone())),
            match &self.attachment {
                Attachment::Image(img) => FieldValue::union(Box::new(img.clone())),
                Attachment::Note(note) => FieldValue::union(Box::new(note.clone())),
            },
        ])
    }

    fn from_row(r: &mut RowReader<'_>) -> Result<Self> {
        let subject = r.text()?;
        let child = r.union()?;
        let attachment = if child.is::<Image>() {
            Attachment::Image(child.downcast()?)
        } else if child.is::<Note>() {
            Attachment::Note(child.downcast()?)
        } else {
            return Err(crate::Error::Assembly(format!(
                "unexpected attachment tag {}",
                child.tag
            )));
        };
        Ok(Self { subject, attachment })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub note: Option<String>,
    pub score: Option<f64>,
    pub tags: Vec<String>,
    pub active: bool,
}

impl Model for Record {
    fn type_name() -> &'static str {
        "odb::test_models::Record"
    }

    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::new("id", FieldKind::Primitive(Primitive::Int)),
            FieldDef::new("note", FieldKind::OptionalPrimitive(Primitive::Text)),
            FieldDef::new("score", FieldKind::OptionalPrimitive(Primitive::Real)),
            FieldDef::new("tags", FieldKind::Container(ElementType::Primitive(Primitive::Text))),
            FieldDef::new("active", FieldKind::Primitive(Primitive::Bool)),
        ]
    }

    fn to_values(&self, codec: &dyn BlobCodec) -> Result<Vec<FieldValue>> {
        Ok(vec![
            FieldValue::Scalar(Value::Int(self.id)),
            FieldValue::Scalar(Value::from(self.note.clone())),
            FieldValue::Scalar(Value::from(self.score)),
            FieldValue::container(codec, &self.tags)?,
            FieldValue::Scalar(Value::Bool(self.active)),
        ])
    }

    fn from_row(r: &mut RowReader<'_>) -> Result<Self> {
        Ok(Self {
            id: r.i64()?,
            note: r.opt_text()?,
            score: r.opt_f64()?,
            tags: r.container()?,
            active: r.bool()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub name: String,
    pub avatar: Option<Image>,
}

impl Model for Profile {
    fn type_name() -> &'static str {
        "odb::test_models::Profile"
    }

    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::new("name", FieldKind::Primitive(Primitive::Text)),
            FieldDef::new("avatar", FieldKind::OptionalReference(shape_of::<Image>())),
        ]
    }

    fn to_values(&self, _codec: &dyn BlobCodec) -> Result<Vec<FieldValue>> {
        Ok(vec![
            FieldValue::Scalar(Value::Text(self.name.clone())),
            FieldValue::opt_child(&self.avatar),
        ])
    }

    fn from_row(r: &mut RowReader<'_>) -> Result<Self> {
        Ok(Self {
            name: r.text()?,
            avatar: r.opt_child()?,
        })
    }
}

/// Exercises the post-assembly hook: `live` is persisted as false and flipped
/// back on by `post_assemble`.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub live: bool,
}

impl Model for Session {
    fn type_name() -> &'static str {
        "odb::test_models::Session"
    }

    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::new("token", FieldKind::Primitive(Primitive::Text)),
            FieldDef::new("live", FieldKind::Primitive(Primitive::Bool)),
        ]
    }

    fn to_values(&self, _codec: &dyn BlobCodec) -> Result<Vec<FieldValue>> {
        Ok(vec![
            FieldValue::Scalar(Value::Text(self.token.clone())),
            FieldValue::Scalar(Value::Bool(false)),
        ])
    }

    fn from_row(r: &mut RowReader<'_>) -> Result<Self> {
        Ok(Self {
            token: r.text()?,
            live: r.bool()?,
        })
    }

    fn post_assemble(&mut self) {
        self.live = true;
    }
}

// Second independent parent of LineItem, for shared-dependency removal tests
#[derive(Debug, Clone, PartialEq)]
pub struct Shipment {
    pub carrier: String,
    pub item: LineItem,
}

impl Model for Shipment {
    fn type_name() -> &'static str {
        "odb::test_models::Shipment"
    }

    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::new("carrier", FieldKind::Primitive(Primitive::Text)),
            FieldDef::new("item", FieldKind::Reference(shape_of::<LineItem>())),
        ]
    }

    fn to_values(&self, _codec: &dyn BlobCodec) -> Result<Vec<FieldValue>> {
        Ok(vec![
            FieldValue::Scalar(Value::Text(self.carrier.clone())),
            FieldValue::child(&self.item),
        ])
    }

    fn from_row(r: &mut RowReader<'_>) -> Result<Self> {
        Ok(Self {
            carrier: r.text()?,
            item: r.child()?,
        })
    }
}

// Depth-chain fixtures: DeepA -> DeepB -> DeepC

#[derive(Debug, Clone, PartialEq)]
pub struct DeepC {
    pub x: i64,
}

impl Model for DeepC {
    fn type_name() -> &'static str {
        "odb::test_models::DeepC"
    }

    fn fields() -> Vec<FieldDef> {
        vec![FieldDef::new("x", FieldKind::Primitive(Primitive::Int))]
    }

    fn to_values(&self, _codec: &dyn BlobCodec) -> Result<Vec<FieldValue>> {
        Ok(vec![FieldValue::Scalar(Value::Int(self.x))])
    }

    fn from_row(r: &mut RowReader<'_>) -> Result<Self> {
        Ok(Self { x: r.i64()? })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeepB {
    pub c: DeepC,
}

impl Model for DeepB {
    fn type_name() -> &'static str {
        "odb::test_models::DeepB"
    }

    fn fields() -> Vec<FieldDef> {
        vec![FieldDef::new("c", FieldKind::Reference(shape_of::<DeepC>()))]
    }

    fn to_values(&self, _codec: &dyn BlobCodec) -> Result<Vec<FieldValue>> {
        Ok(vec![FieldValue::child(&self.c)])
    }

    fn from_row(r: &mut RowReader<'_>) -> Result<Self> {
        Ok(Self { c: r.child()? })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeepA {
    pub b: DeepB,
}

impl Model for DeepA {
    fn type_name() -> &'static str {
        "odb::test_models::DeepA"
    }

    fn fields() -> Vec<FieldDef> {
        vec![FieldDef::new("b", FieldKind::Reference(shape_of::<DeepB>()))]
    }

    fn to_values(&self, _codec: &dyn BlobCodec) -> Result<Vec<FieldValue>> {
        Ok(vec![FieldValue::child(&self.b)])
    }

    fn from_row(r: &mut RowReader<'_>) -> Result<Self> {
        Ok(Self { b: r.child()? })
    }
}

// Illegal shapes, rejected at disassembly time

/// Union mixing a primitive and a registered type
#[derive(Debug, Clone)]
pub struct MixedUnion {
    pub value: String,
}

impl Model for MixedUnion {
    fn type_name() -> &'static str {
        "odb::test_models::MixedUnion"
    }

    fn fields() -> Vec<FieldDef> {
        vec![FieldDef::new(
            "value",
            FieldKind::MultiReference(vec![
                UnionAlt::Primitive(Primitive::Text),
                UnionAlt::Shape(shape_of::<Note>()),
            ]),
        )]
    }

    fn to_values(&self, _codec: &dyn BlobCodec) -> Result<Vec<FieldValue>> {
        Ok(vec![FieldValue::Scalar(Value::Text(self.value.clone()))])
    }

    fn from_row(r: &mut RowReader<'_>) -> Result<Self> {
        Ok(Self { value: r.text()? })
    }
}

/// Container of a custom element type - not relationally decomposable
#[derive(Debug, Clone)]
pub struct CustomContainer {
    pub notes: Vec<Note>,
}

impl Model for CustomContainer {
    fn type_name() -> &'static str {
        "odb::test_models::CustomContainer"
    }

    fn fields() -> Vec<FieldDef> {
        vec![FieldDef::new(
            "notes",
            FieldKind::Container(ElementType::Custom("odb::test_models::Note")),
        )]
    }

    fn to_values(&self, _codec: &dyn BlobCodec) -> Result<Vec<FieldValue>> {
        Ok(vec![FieldValue::Scalar(Value::Null)])
    }

    fn from_row(_r: &mut RowReader<'_>) -> Result<Self> {
        Ok(Self { notes: Vec::new() })
    }
}

/// Field name colliding with a reserved column
#[derive(Debug, Clone)]
pub struct ReservedField {
    pub uid: String,
}

impl Model for ReservedField {
    fn type_name() -> &'static str {
        "odb::test_models::ReservedField"
    }

    fn fields() -> Vec<FieldDef> {
        vec![FieldDef::new("uid", FieldKind::Primitive(Primitive::Text))]
    }

    fn to_values(&self, _codec: &dyn BlobCodec) -> Result<Vec<FieldValue>> {
        Ok(vec![FieldValue::Scalar(Value::Text(self.uid.clone()))])
    }

    fn from_row(r: &mut RowReader<'_>) -> Result<Self> {
        Ok(Self { uid: r.text()? })
    }
}
