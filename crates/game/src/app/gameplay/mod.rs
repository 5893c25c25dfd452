mod enemy;
mod loot;
mod persistence;
mod player;
mod progression;
mod scene_impl;
mod simulation;
mod tower;

pub(crate) use persistence::PersistenceStore;
pub(crate) use progression::ProgressionEngine;
pub(crate) use scene_impl::{default_tower_layout, DefenseScene};
pub(crate) use simulation::{SimConfig, Simulation};
