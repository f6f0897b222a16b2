use crate::domain::string_id;

string_id!(
    /// Identity supplied by the upstream auth gateway.
    UserId
);
