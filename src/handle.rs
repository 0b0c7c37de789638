//! Read-side views of a parsed serialized file.
//!
//! [`SerializedFileHandle`] ties a [`SerializedFile`] to its bytes and the [`Environment`] it was
//! loaded in. [`ObjectHandle`] narrows that to one object and knows which type tree to use for
//! it, which for `MonoBehaviour`s of bundles built without script type trees means generating
//! one from the script's class.

use std::borrow::Cow;
use std::io::Cursor;

use anyhow::{Context as _, Result};
use rabex::files::SerializedFile;
use rabex::files::serializedfile::ObjectRef;
use rabex::objects::ClassId;
use rabex::objects::pptr::PathId;
use rabex::serde_typetree;
use rabex::typetree::TypeTreeNode;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Environment;
use crate::unity::types::MonoScript;

#[derive(Clone, Copy)]
pub struct SerializedFileHandle<'a> {
    pub file: &'a SerializedFile,
    pub data: &'a [u8],
    pub env: &'a Environment,
}

pub struct ObjectHandle<'a, T> {
    pub object: ObjectRef<'a, T>,
    pub file: SerializedFileHandle<'a>,
}

impl<T> std::fmt::Debug for ObjectHandle<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("object", &self.object.info)
            .finish()
    }
}

impl<'a> SerializedFileHandle<'a> {
    pub fn new(env: &'a Environment, file: &'a SerializedFile, data: &'a [u8]) -> Self {
        SerializedFileHandle { file, data, env }
    }

    pub fn reader(&self) -> Cursor<&'a [u8]> {
        Cursor::new(self.data)
    }

    pub fn object_at<T>(&self, path_id: PathId) -> Result<ObjectHandle<'a, T>> {
        let object = self.file.get_object(path_id, &self.env.tpk)?;
        Ok(ObjectHandle { object, file: *self })
    }
}

impl<'a, T> ObjectHandle<'a, T> {
    pub fn path_id(&self) -> PathId {
        self.object.info.m_PathID
    }

    pub fn class_id(&self) -> ClassId {
        self.object.info.m_ClassID
    }

    /// The object's payload inside the file.
    pub fn data(&self) -> &'a [u8] {
        let start = self.object.info.m_Offset as usize;
        &self.file.data[start..start + self.object.info.m_Size as usize]
    }

    /// Script classes are stored against the bare `MonoBehaviour` type tree when the bundle was
    /// built without type trees, so their fields need a generated one.
    fn needs_generated_typetree(&self) -> bool {
        self.class_id() == ClassId::MonoBehaviour
            && self.file.env.typetree_generator.can_generate()
            && matches!(&self.object.tt, Ok(tt) if tt.m_Type == "MonoBehaviour")
    }

    /// The type tree this object is read and written with.
    pub fn typetree(&self) -> Result<Cow<'_, TypeTreeNode>> {
        if !self.needs_generated_typetree() {
            return Ok(Cow::Borrowed(self.object.typetree()?));
        }

        let script = self
            .mono_script()?
            .with_context(|| format!("MonoBehaviour {} has no MonoScript", self.path_id()))?;
        let tt = self
            .file
            .env
            .typetree_generator
            .generate(&script.assembly_name(), &script.full_name())?;
        Ok(Cow::Borrowed(tt))
    }

    pub fn mono_script(&self) -> Result<Option<MonoScript>> {
        let Some(script) = self.file.file.script_type(self.object.info) else {
            return Ok(None);
        };
        self.file
            .env
            .read_mono_script(script, self.file.file, self.file.data)
            .map(Some)
    }

    pub fn read<U: DeserializeOwned>(&self) -> Result<U> {
        self.decode(self.data())
    }

    /// Decodes `data` as if it were this object's payload.
    pub fn decode<U: DeserializeOwned>(&self, data: &[u8]) -> Result<U> {
        let tt = self.typetree()?;
        serde_typetree::from_reader_endianed::<U>(
            &mut Cursor::new(data),
            &tt,
            self.file.file.m_Header.m_Endianess,
        )
        .with_context(|| format!("Failed to deserialize {:?} {}", self.class_id(), self.path_id()))
    }

    pub fn encode<U: Serialize>(&self, value: &U) -> Result<Vec<u8>> {
        let tt = self.typetree()?;
        serde_typetree::to_vec_endianed(value, &tt, self.file.file.m_Header.m_Endianess)
            .with_context(|| format!("Failed to serialize {:?} {}", self.class_id(), self.path_id()))
    }
}
