pub mod hash;
pub mod extraction; // Cascading text extraction with quality gate
pub mod artifacts; // Versioned, integrity-verified model store
