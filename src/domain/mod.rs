// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust structs and traits that define the core concepts:
// tasks, partial labels, masks over batches, samples, and the
// seams the training core talks through.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// The four tasks and the optional label each sample carries per task
pub mod task;

// Which samples of a batch are labelled for a task
pub mod mask;

// A scanned photograph and the loop phases
pub mod sample;

// Core abstractions (traits) that other layers implement
pub mod traits;
