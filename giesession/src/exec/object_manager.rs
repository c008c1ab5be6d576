// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Registry of objects produced by evaluated ops

use crate::exec::OpOutput;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Key to object map shared by the executor and the eager wrappers
#[derive(Default)]
pub struct ObjectManager {
    objects: RwLock<HashMap<String, OpOutput>>,
}

impl ObjectManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: impl Into<String>, object: OpOutput) {
        self.objects.write().insert(key.into(), object);
    }

    pub fn get(&self, key: &str) -> Option<OpOutput> {
        self.objects.read().get(key).cloned()
    }

    pub fn pop(&self, key: &str) -> Option<OpOutput> {
        self.objects.write().remove(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    pub fn clear(&self) {
        self.objects.write().clear();
    }
}
