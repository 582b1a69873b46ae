pub mod fixtures;

pub use fixtures::CaptureFixtures;
