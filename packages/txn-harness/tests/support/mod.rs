#![allow(dead_code)]

pub mod appointments;
