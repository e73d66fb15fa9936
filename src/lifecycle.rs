/// A status that only moves forward and stops moving once terminal.
///
/// Shared by chat messages and workflow steps so that "frozen once done" is
/// enforced the same way in both places.
pub trait Lifecycle: Copy + Eq + std::fmt::Debug {
    fn is_terminal(self) -> bool;

    fn allows(self, next: Self) -> bool;

    /// Moves `current` to `next` when allowed. Returns whether it moved.
    fn advance(current: &mut Self, next: Self) -> bool {
        if current.is_terminal() || !current.allows(next) {
            return false;
        }
        *current = next;
        true
    }
}
