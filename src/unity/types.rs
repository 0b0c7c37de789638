#![allow(non_snake_case)]

use std::borrow::Cow;

use rabex::objects::{ClassId, ClassIdType};
use serde_derive::{Deserialize, Serialize};

/// Only the name of an object. Read with the object's full type tree, skipping every other
/// field, so it also works for MonoBehaviours where `m_Name` follows the behaviour's header.
#[derive(Debug, Deserialize)]
pub struct NamedObject {
    pub m_Name: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct MonoScript {
    pub m_Name: String,
    pub m_ExecutionOrder: i32,
    pub m_PropertiesHash: [u8; 16],
    pub m_ClassName: String,
    pub m_Namespace: String,
    pub m_AssemblyName: String,
}
impl MonoScript {
    pub fn assembly_name(&self) -> Cow<'_, str> {
        match self.m_AssemblyName.ends_with(".dll") {
            true => Cow::Borrowed(&self.m_AssemblyName),
            false => Cow::Owned(format!("{}.dll", self.m_AssemblyName)),
        }
    }

    pub fn full_name(&self) -> Cow<'_, str> {
        match self.m_Namespace.is_empty() {
            true => Cow::Borrowed(&self.m_ClassName),
            false => Cow::Owned(format!("{}.{}", self.m_Namespace, self.m_ClassName)),
        }
    }
}
impl ClassIdType for MonoScript {
    const CLASS_ID: ClassId = ClassId::MonoScript;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(namespace: &str, assembly: &str) -> MonoScript {
        MonoScript {
            m_Name: "TMP_FontAsset".into(),
            m_ExecutionOrder: 0,
            m_PropertiesHash: [0; 16],
            m_ClassName: "TMP_FontAsset".into(),
            m_Namespace: namespace.into(),
            m_AssemblyName: assembly.into(),
        }
    }

    #[test]
    fn name_after_other_fields() {
        let behaviour = serde_json::json!({
            "m_GameObject": { "m_FileID": 0, "m_PathID": 0 },
            "m_Enabled": 1,
            "m_Script": { "m_FileID": 1, "m_PathID": 11500000 },
            "m_Name": "chinese_body_bold",
            "m_fontInfo": { "Name": "x" },
        });
        let named: NamedObject = serde_json::from_value(behaviour).unwrap();
        assert_eq!(named.m_Name, "chinese_body_bold");
    }

    #[test]
    fn script_names() {
        let tmp = script("TMPro", "Unity.TextMeshPro");
        assert_eq!(tmp.assembly_name(), "Unity.TextMeshPro.dll");
        assert_eq!(tmp.full_name(), "TMPro.TMP_FontAsset");

        let global = script("", "Assembly-CSharp.dll");
        assert_eq!(global.assembly_name(), "Assembly-CSharp.dll");
        assert_eq!(global.full_name(), "TMP_FontAsset");
    }
}
