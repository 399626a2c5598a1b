//! Wire commands. Each module encodes one kind of request, sends it through the node's transport
//! and decodes the response.

pub(crate) mod admin_command;
pub(crate) mod background_udf_command;
pub(crate) mod batch_command;
pub(crate) mod buffer;
pub(crate) mod delete_command;
pub(crate) mod execute_udf_command;
pub(crate) mod exists_command;
pub(crate) mod info_command;
pub(crate) mod operate_command;
pub(crate) mod read_command;
pub(crate) mod single_command;
pub(crate) mod stream_command;
pub(crate) mod touch_command;
pub(crate) mod write_command;

mod field_type;
mod particle_type;

pub use self::particle_type::ParseParticleError;
pub(crate) use self::particle_type::ParticleType;
