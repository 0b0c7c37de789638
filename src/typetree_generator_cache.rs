use anyhow::{Result, bail};
use elsa::sync::FrozenMap;
use rabex::typetree::TypeTreeNode;
use typetree_generator_api::TypeTreeGenerator;

struct Loaded {
    generator: TypeTreeGenerator,
    base_node: TypeTreeNode,
}

/// Script type trees generated from the game's `Managed` assemblies, keyed by
/// `(assembly, full class name)`.
#[derive(Default)]
pub struct TypeTreeGeneratorCache {
    loaded: Option<Loaded>,
    cache: FrozenMap<(String, String), Box<TypeTreeNode>>,
}
impl TypeTreeGeneratorCache {
    /// `base_node` is the `MonoBehaviour` class node the script fields are appended to.
    pub fn install(&mut self, generator: TypeTreeGenerator, base_node: TypeTreeNode) {
        self.loaded = Some(Loaded { generator, base_node });
        self.cache = FrozenMap::default();
    }

    pub fn can_generate(&self) -> bool {
        self.loaded.is_some()
    }

    /// Falls back to the plain `MonoBehaviour` node if the generator doesn't know the class.
    pub fn generate(&self, assembly_name: &str, full_name: &str) -> Result<&TypeTreeNode> {
        let key = (assembly_name.to_owned(), full_name.to_owned());
        if let Some(node) = self.cache.get(&key) {
            return Ok(node);
        }

        let Some(Loaded { generator, base_node }) = &self.loaded else {
            bail!("No typetree generator loaded, cannot generate {assembly_name} / {full_name}");
        };
        let node = match generator.generate_typetree_raw(base_node.clone(), assembly_name, full_name)? {
            Some(node) => node,
            None => {
                tracing::debug!("No typetree for {assembly_name} / {full_name}, using base node");
                base_node.clone()
            }
        };
        Ok(self.cache.insert(key, Box::new(node)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cache_cannot_generate() {
        let cache = TypeTreeGeneratorCache::default();
        assert!(!cache.can_generate());
        let error = cache.generate("Unity.TextMeshPro.dll", "TMPro.TMP_FontAsset").unwrap_err();
        assert!(error.to_string().contains("TMPro.TMP_FontAsset"));
    }
}
