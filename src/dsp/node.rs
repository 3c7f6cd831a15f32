//! Audio node trait
//!
//! Every processing stage of the signal graph implements [`AudioNode`]. Nodes
//! process stereo render quanta in place and own their automated parameters.

use crate::engine::AudioBuffer;

/// Base trait for all graph nodes
pub trait AudioNode: Send {
    /// Process one block in place
    ///
    /// Blocks are stereo and at most [`RENDER_QUANTUM`](crate::engine::RENDER_QUANTUM)
    /// frames long. Automated parameters advance by the block length.
    fn process(&mut self, block: &mut AudioBuffer);

    /// Reset node state
    ///
    /// Clears filter history and delay lines; parameter values are kept.
    fn reset(&mut self);

    /// Get the node type identifier
    fn node_type(&self) -> &'static str;

    /// Get human-readable display name
    fn display_name(&self) -> &str;
}

/// Helper macro to implement the identifier methods of [`AudioNode`]
#[macro_export]
macro_rules! impl_node_common {
    ($node_type:expr, $display_name:expr) => {
        fn node_type(&self) -> &'static str {
            $node_type
        }

        fn display_name(&self) -> &str {
            $display_name
        }
    };
}
