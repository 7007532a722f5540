// entity.rs — level entity key/value storage

use std::collections::HashMap;

use crate::math::{Vec3, VEC3_ORIGIN};

/// One entity from the level's entity lump.
///
/// Keys keep their first-seen order so a round-trip through an editor does
/// not shuffle the text the mapper wrote.
#[derive(Debug, Clone, Default)]
pub struct Entity {
    keyvalues: HashMap<String, String>,
    key_order: Vec<String>,
}

impl Entity {
    pub fn new(classname: &str) -> Self {
        let mut ent = Entity::default();
        ent.set_keyvalue("classname", classname);
        ent
    }

    pub fn classname(&self) -> &str {
        self.keyvalue("classname")
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.keyvalues.contains_key(key)
    }

    /// Value for `key`, or the empty string when the key is absent.
    pub fn keyvalue(&self, key: &str) -> &str {
        self.keyvalues.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn set_keyvalue(&mut self, key: &str, value: &str) {
        if !self.keyvalues.contains_key(key) {
            self.key_order.push(key.to_string());
        }
        self.keyvalues.insert(key.to_string(), value.to_string());
    }

    /// Keys in first-seen order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.key_order.iter().map(String::as_str)
    }

    /// Submodel index from a "*N" model key, or -1 when the entity does not
    /// reference a submodel.
    pub fn bsp_model_idx(&self) -> i32 {
        let model = self.keyvalue("model");
        match model.strip_prefix('*') {
            Some(idx) => idx.parse().unwrap_or(-1),
            None => -1,
        }
    }

    pub fn is_bsp_model(&self) -> bool {
        self.bsp_model_idx() >= 0
    }

    /// Parsed "origin" key. Missing key or junk fields read as zero.
    pub fn origin(&self) -> Vec3 {
        parse_vec3(self.keyvalue("origin"))
    }
}

/// Parse up to three whitespace-separated floats; missing fields are zero.
pub fn parse_vec3(s: &str) -> Vec3 {
    let mut v = VEC3_ORIGIN;
    for (i, part) in s.split_whitespace().take(3).enumerate() {
        v[i] = part.parse().unwrap_or(0.0);
    }
    v
}
