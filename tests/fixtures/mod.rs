#![allow(dead_code)]

pub mod story_graphs;
