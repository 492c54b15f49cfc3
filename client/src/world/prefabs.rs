use std::collections::HashMap;

use meridian_shared::{PrefabHash, Replicate, SceneId};

use crate::ClientError;

type PrefabFactory = Box<dyn Fn() -> Vec<Box<dyn Replicate>> + Send>;

/// Where spawned objects come from: a factory per prefab hash, and the
/// dormant scene objects waiting for the server to spawn them
#[derive(Default)]
pub struct Prefabs {
    factories: HashMap<PrefabHash, PrefabFactory>,
    scene_objects: HashMap<SceneId, Vec<Box<dyn Replicate>>>,
}

impl Prefabs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_prefab<F>(&mut self, prefab_hash: PrefabHash, factory: F) -> Result<(), ClientError>
    where
        F: Fn() -> Vec<Box<dyn Replicate>> + Send + 'static,
    {
        if self.factories.contains_key(&prefab_hash) {
            return Err(ClientError::PrefabAlreadyRegistered { prefab_hash });
        }
        self.factories.insert(prefab_hash, Box::new(factory));
        Ok(())
    }

    pub fn instantiate(&self, prefab_hash: &PrefabHash) -> Option<Vec<Box<dyn Replicate>>> {
        self.factories.get(prefab_hash).map(|factory| factory())
    }

    pub fn add_scene_object(
        &mut self,
        scene_id: SceneId,
        components: Vec<Box<dyn Replicate>>,
    ) -> Result<(), ClientError> {
        if self.scene_objects.contains_key(&scene_id) {
            return Err(ClientError::SceneObjectAlreadyRegistered { scene_id });
        }
        self.scene_objects.insert(scene_id, components);
        Ok(())
    }

    pub fn take_scene_object(&mut self, scene_id: &SceneId) -> Option<Vec<Box<dyn Replicate>>> {
        self.scene_objects.remove(scene_id)
    }

    /// Puts a hidden scene object back in the pool
    pub fn return_scene_object(&mut self, scene_id: SceneId, components: Vec<Box<dyn Replicate>>) {
        self.scene_objects.insert(scene_id, components);
    }

    pub fn is_scene_object_dormant(&self, scene_id: &SceneId) -> bool {
        self.scene_objects.contains_key(scene_id)
    }
}
