//! Concrete ID types.

use crate::{define_id, define_uuid_id};

define_uuid_id!(GameserverId);

define_id!(RequestId, "req");
