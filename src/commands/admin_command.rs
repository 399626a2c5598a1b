//! User and role management over the admin protocol.
//!
//! Admin messages carry a 16-byte header after the protocol header: an unused byte, the result
//! code, the command, the field count and 12 reserved bytes. Fields follow as
//! `u32 size + 1, u8 id, data`.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use super::buffer::{Buffer, BufferError, ProtoHeader, ProtoType, Version};
use crate::{
    cluster::Cluster,
    errors::{Error, ParseError, Result},
    net::FrameStream,
    policies::AdminPolicy,
    user::{Privilege, PrivilegeCode, Role, User},
    ResultCode,
};

#[derive(Clone, Copy, Debug)]
enum Command {
    CreateUser = 1,
    DropUser = 2,
    SetPassword = 3,
    ChangePassword = 4,
    GrantRoles = 5,
    RevokeRoles = 6,
    QueryUsers = 9,
    CreateRole = 10,
    DropRole = 11,
    GrantPrivileges = 12,
    RevokePrivileges = 13,
    SetWhitelist = 14,
    SetQuotas = 15,
    QueryRoles = 16,
    Login = 20,
}

#[derive(Clone, Copy, Debug)]
enum FieldId {
    User = 0,
    Password = 1,
    OldPassword = 2,
    Credential = 3,
    Roles = 10,
    Role = 11,
    Privileges = 12,
    Whitelist = 13,
    ReadQuota = 14,
    WriteQuota = 15,
    ReadInfo = 16,
    WriteInfo = 17,
    Connections = 18,
}

const HEADER_SIZE: usize = 16;

/// Hash a password the way the server expects it, with bcrypt and a fixed salt.
pub fn hash_password(password: &str) -> Result<String> {
    const COST: u32 = 10;
    const SALT: [u8; 16] = [
        0xf4, 0x6b, 0x0b, 0xbe, 0xcf, 0xfe, 0x8d, 0x1b, 0x06, 0x67, 0xd8, 0x4f, 0x6d, 0xc1, 0xd8,
        0xa9,
    ];
    const VERSION: bcrypt::Version = bcrypt::Version::TwoA;

    bcrypt::hash_with_salt(password, COST, SALT)
        .map(|hash| hash.format_for_version(VERSION))
        .map_err(|e| Error::invalid_argument(format!("failed hashing password: {e}")))
}

/// Request that authenticates a fresh connection with the already hashed password.
pub(crate) fn login_request(user: &str, hashed_password: &str) -> Bytes {
    let mut request = Request::new(Command::Login);
    request.field(FieldId::User, user.as_bytes());
    request.field(FieldId::Credential, hashed_password.as_bytes());
    request.freeze()
}

/// Result code of a single admin response frame.
pub(crate) fn result_code(frame: Bytes) -> Result<ResultCode, BufferError> {
    let mut buf = Buffer::frame(frame, ProtoType::Admin)?;
    buf.skip(1)?;
    Ok(ResultCode::from(buf.read_u8()?))
}

/// Builder for admin requests.
struct Request {
    command: Command,
    field_count: u8,
    fields: BytesMut,
}

impl Request {
    fn new(command: Command) -> Self {
        Self {
            command,
            field_count: 0,
            fields: BytesMut::new(),
        }
    }

    fn field(&mut self, id: FieldId, data: &[u8]) {
        self.field_header(id, data.len());
        self.fields.put_slice(data);
    }

    fn field_header(&mut self, id: FieldId, size: usize) {
        self.fields.put_u32(size as u32 + 1);
        self.fields.put_u8(id as u8);
        self.field_count += 1;
    }

    fn u32_field(&mut self, id: FieldId, value: u32) {
        self.field_header(id, 4);
        self.fields.put_u32(value);
    }

    /// A list of names, each prefixed with its length in a single byte.
    fn names(&mut self, id: FieldId, names: &[&str]) -> Result<()> {
        let count = short_len(names.len(), "name list")?;
        let size = 1 + names.iter().map(|name| 1 + name.len()).sum::<usize>();

        self.field_header(id, size);
        self.fields.put_u8(count);
        for name in names {
            self.fields.put_u8(short_len(name.len(), name)?);
            self.fields.put_slice(name.as_bytes());
        }
        Ok(())
    }

    fn privileges(&mut self, privileges: &[Privilege]) -> Result<()> {
        let mut data = BytesMut::new();
        data.put_u8(short_len(privileges.len(), "privilege list")?);

        for privilege in privileges {
            data.put_u8(privilege.code.to_u8());
            if privilege.code.can_scope() {
                let namespace = privilege.namespace.as_deref().unwrap_or_default();
                let set_name = privilege.set_name.as_deref().unwrap_or_default();
                data.put_u8(short_len(namespace.len(), namespace)?);
                data.put_slice(namespace.as_bytes());
                data.put_u8(short_len(set_name.len(), set_name)?);
                data.put_slice(set_name.as_bytes());
            } else if privilege.namespace.is_some() || privilege.set_name.is_some() {
                return Err(Error::invalid_argument(format!(
                    "privilege `{}` can't be scoped to a namespace or set",
                    privilege.code
                )));
            }
        }

        self.field(FieldId::Privileges, &data);
        Ok(())
    }

    fn freeze(self) -> Bytes {
        let mut buf = BytesMut::with_capacity(ProtoHeader::SIZE + HEADER_SIZE + self.fields.len());
        ProtoHeader {
            version: Version::V2,
            ty: ProtoType::Admin,
            size: HEADER_SIZE + self.fields.len(),
        }
        .write_to(&mut buf);

        buf.put_u8(0);
        buf.put_u8(0);
        buf.put_u8(self.command as u8);
        buf.put_u8(self.field_count);
        buf.put_bytes(0, 12);
        buf.put_slice(&self.fields);
        buf.freeze()
    }
}

fn short_len(len: usize, what: &str) -> Result<u8> {
    u8::try_from(len)
        .map_err(|_| Error::invalid_argument(format!("`{what}` exceeds 255 entries or bytes")))
}

/// Send a request to a random node and check the result code of the response.
async fn execute(cluster: &Cluster, policy: &AdminPolicy, request: Request) -> Result<()> {
    let command = request.command;
    let node = cluster.get_random_node().await.ok_or(Error::NoNodes)?;
    let frame = node
        .transport()
        .send(node.host(), request.freeze(), Some(policy.timeout))
        .await?;

    match result_code(frame)? {
        ResultCode::Ok => Ok(()),
        code => {
            debug!(?command, %node, %code, "admin command failed");
            Err(Error::Server(code))
        }
    }
}

/// Send a query request and parse the records of the response until the server signals the
/// end with [`ResultCode::QueryEnd`].
async fn query<T>(
    cluster: &Cluster,
    policy: &AdminPolicy,
    request: Request,
    parse: fn(&mut Buffer, u8) -> Result<T>,
) -> Result<Vec<T>> {
    let node = cluster.get_random_node().await.ok_or(Error::NoNodes)?;
    let mut stream = node
        .transport()
        .stream(node.host(), request.freeze(), Some(policy.timeout))
        .await?;

    let mut list = Vec::new();
    let result = read_query(stream.as_mut(), parse, &mut list).await;

    stream.finish(result.is_ok()).await;
    result.map(|()| list)
}

async fn read_query<T>(
    stream: &mut dyn FrameStream,
    parse: fn(&mut Buffer, u8) -> Result<T>,
    list: &mut Vec<T>,
) -> Result<()> {
    loop {
        let mut buf = Buffer::frame(stream.next_frame().await?, ProtoType::Admin)?;
        while !buf.is_empty() {
            buf.skip(1)?;
            let code = ResultCode::from(buf.read_u8()?);
            buf.skip(1)?;
            let field_count = buf.read_u8()?;
            buf.skip(12)?;

            match code {
                ResultCode::Ok => list.push(parse(&mut buf, field_count)?),
                ResultCode::QueryEnd => return Ok(()),
                code => return Err(Error::Server(code)),
            }
        }
    }
}

/// Split the fields of a query response record into `(id, data)` pairs.
fn read_fields(buf: &mut Buffer, field_count: u8) -> Result<Vec<(u8, Buffer)>> {
    (0..field_count)
        .map(|_| {
            let size = buf.read_u32()? as usize;
            let data_size = size
                .checked_sub(1)
                .ok_or_else(|| ParseError::Info("empty admin field".to_owned()))?;
            let id = buf.read_u8()?;
            Ok((id, buf.split_to(data_size)?))
        })
        .collect()
}

fn read_names(buf: &mut Buffer) -> Result<Vec<String>> {
    let count = buf.read_u8()?;
    (0..count)
        .map(|_| {
            let len = buf.read_u8()?;
            Ok(buf.read_str(len.into())?)
        })
        .collect()
}

fn read_info(buf: &mut Buffer) -> Result<Vec<u32>> {
    let count = buf.read_u8()?;
    (0..count).map(|_| Ok(buf.read_u32()?)).collect()
}

fn parse_user(buf: &mut Buffer, field_count: u8) -> Result<User> {
    let mut user = User::default();
    for (id, mut data) in read_fields(buf, field_count)? {
        match id {
            id if id == FieldId::User as u8 => {
                user.user = data.read_str(data.remaining())?;
            }
            id if id == FieldId::Roles as u8 => user.roles = read_names(&mut data)?,
            id if id == FieldId::ReadInfo as u8 => user.read_info = read_info(&mut data)?,
            id if id == FieldId::WriteInfo as u8 => user.write_info = read_info(&mut data)?,
            id if id == FieldId::Connections as u8 => user.conns_in_use = data.read_u32()?,
            _ => {}
        }
    }
    Ok(user)
}

fn parse_role(buf: &mut Buffer, field_count: u8) -> Result<Role> {
    let mut role = Role::default();
    for (id, mut data) in read_fields(buf, field_count)? {
        match id {
            id if id == FieldId::Role as u8 => role.name = data.read_str(data.remaining())?,
            id if id == FieldId::Privileges as u8 => role.privileges = read_privileges(&mut data)?,
            id if id == FieldId::Whitelist as u8 => {
                role.allowlist = data
                    .read_str(data.remaining())?
                    .split(',')
                    .filter(|addr| !addr.is_empty())
                    .map(ToOwned::to_owned)
                    .collect();
            }
            id if id == FieldId::ReadQuota as u8 => role.read_quota = data.read_u32()?,
            id if id == FieldId::WriteQuota as u8 => role.write_quota = data.read_u32()?,
            _ => {}
        }
    }
    Ok(role)
}

fn read_privileges(buf: &mut Buffer) -> Result<Vec<Privilege>> {
    let count = buf.read_u8()?;
    let mut privileges = Vec::with_capacity(count.into());

    for _ in 0..count {
        let raw = buf.read_u8()?;
        let code = PrivilegeCode::from_u8(raw)
            .ok_or_else(|| ParseError::Info(format!("unknown privilege code {raw}")))?;

        if code.can_scope() {
            let len = buf.read_u8()?;
            let namespace = buf.read_str(len.into())?;
            let len = buf.read_u8()?;
            let set_name = buf.read_str(len.into())?;
            privileges.push(Privilege {
                code,
                namespace: (!namespace.is_empty()).then_some(namespace),
                set_name: (!set_name.is_empty()).then_some(set_name),
            });
        } else {
            privileges.push(Privilege::global(code));
        }
    }

    Ok(privileges)
}

pub(crate) async fn create_user(
    cluster: &Cluster,
    policy: &AdminPolicy,
    user: &str,
    password: &str,
    roles: &[&str],
) -> Result<()> {
    let mut request = Request::new(Command::CreateUser);
    request.field(FieldId::User, user.as_bytes());
    request.field(FieldId::Password, hash_password(password)?.as_bytes());
    request.names(FieldId::Roles, roles)?;
    execute(cluster, policy, request).await
}

pub(crate) async fn drop_user(cluster: &Cluster, policy: &AdminPolicy, user: &str) -> Result<()> {
    let mut request = Request::new(Command::DropUser);
    request.field(FieldId::User, user.as_bytes());
    execute(cluster, policy, request).await
}

/// Change the password of a user. Changing the password of the user the client is logged in
/// with requires the old password as well, which is taken from the client policy.
pub(crate) async fn change_password(
    cluster: &Cluster,
    policy: &AdminPolicy,
    user: &str,
    password: &str,
) -> Result<()> {
    let hashed = hash_password(password)?;

    let request = match &cluster.client_policy().user_password {
        Some((current_user, old_hash)) if current_user == user => {
            let mut request = Request::new(Command::ChangePassword);
            request.field(FieldId::User, user.as_bytes());
            request.field(FieldId::OldPassword, old_hash.as_bytes());
            request.field(FieldId::Password, hashed.as_bytes());
            request
        }
        _ => {
            let mut request = Request::new(Command::SetPassword);
            request.field(FieldId::User, user.as_bytes());
            request.field(FieldId::Password, hashed.as_bytes());
            request
        }
    };

    execute(cluster, policy, request).await
}

pub(crate) async fn grant_roles(
    cluster: &Cluster,
    policy: &AdminPolicy,
    user: &str,
    roles: &[&str],
) -> Result<()> {
    let mut request = Request::new(Command::GrantRoles);
    request.field(FieldId::User, user.as_bytes());
    request.names(FieldId::Roles, roles)?;
    execute(cluster, policy, request).await
}

pub(crate) async fn revoke_roles(
    cluster: &Cluster,
    policy: &AdminPolicy,
    user: &str,
    roles: &[&str],
) -> Result<()> {
    let mut request = Request::new(Command::RevokeRoles);
    request.field(FieldId::User, user.as_bytes());
    request.names(FieldId::Roles, roles)?;
    execute(cluster, policy, request).await
}

/// Load a single user, or all users if `user` is `None`.
pub(crate) async fn query_users(
    cluster: &Cluster,
    policy: &AdminPolicy,
    user: Option<&str>,
) -> Result<Vec<User>> {
    let mut request = Request::new(Command::QueryUsers);
    if let Some(user) = user {
        request.field(FieldId::User, user.as_bytes());
    }
    query(cluster, policy, request, parse_user).await
}

pub(crate) async fn create_role(
    cluster: &Cluster,
    policy: &AdminPolicy,
    role: &Role,
) -> Result<()> {
    let mut request = Request::new(Command::CreateRole);
    request.field(FieldId::Role, role.name.as_bytes());
    if !role.privileges.is_empty() {
        request.privileges(&role.privileges)?;
    }
    if !role.allowlist.is_empty() {
        request.field(FieldId::Whitelist, role.allowlist.join(",").as_bytes());
    }
    if role.read_quota > 0 {
        request.u32_field(FieldId::ReadQuota, role.read_quota);
    }
    if role.write_quota > 0 {
        request.u32_field(FieldId::WriteQuota, role.write_quota);
    }
    execute(cluster, policy, request).await
}

pub(crate) async fn drop_role(cluster: &Cluster, policy: &AdminPolicy, role: &str) -> Result<()> {
    let mut request = Request::new(Command::DropRole);
    request.field(FieldId::Role, role.as_bytes());
    execute(cluster, policy, request).await
}

pub(crate) async fn grant_privileges(
    cluster: &Cluster,
    policy: &AdminPolicy,
    role: &str,
    privileges: &[Privilege],
) -> Result<()> {
    let mut request = Request::new(Command::GrantPrivileges);
    request.field(FieldId::Role, role.as_bytes());
    request.privileges(privileges)?;
    execute(cluster, policy, request).await
}

pub(crate) async fn revoke_privileges(
    cluster: &Cluster,
    policy: &AdminPolicy,
    role: &str,
    privileges: &[Privilege],
) -> Result<()> {
    let mut request = Request::new(Command::RevokePrivileges);
    request.field(FieldId::Role, role.as_bytes());
    request.privileges(privileges)?;
    execute(cluster, policy, request).await
}

/// Replace the allowlist of a role. An empty list removes it.
pub(crate) async fn set_allowlist(
    cluster: &Cluster,
    policy: &AdminPolicy,
    role: &str,
    allowlist: &[&str],
) -> Result<()> {
    let mut request = Request::new(Command::SetWhitelist);
    request.field(FieldId::Role, role.as_bytes());
    if !allowlist.is_empty() {
        request.field(FieldId::Whitelist, allowlist.join(",").as_bytes());
    }
    execute(cluster, policy, request).await
}

pub(crate) async fn set_quotas(
    cluster: &Cluster,
    policy: &AdminPolicy,
    role: &str,
    read_quota: u32,
    write_quota: u32,
) -> Result<()> {
    let mut request = Request::new(Command::SetQuotas);
    request.field(FieldId::Role, role.as_bytes());
    request.u32_field(FieldId::ReadQuota, read_quota);
    request.u32_field(FieldId::WriteQuota, write_quota);
    execute(cluster, policy, request).await
}

/// Load a single role, or all roles if `role` is `None`.
pub(crate) async fn query_roles(
    cluster: &Cluster,
    policy: &AdminPolicy,
    role: Option<&str>,
) -> Result<Vec<Role>> {
    let mut request = Request::new(Command::QueryRoles);
    if let Some(role) = role {
        request.field(FieldId::Role, role.as_bytes());
    }
    query(cluster, policy, request, parse_role).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash() {
        let hash = hash_password("admin").unwrap();
        assert!(hash.starts_with("$2a$10$"));
        assert_eq!(60, hash.len());
        assert_eq!(hash, hash_password("admin").unwrap());
        assert_ne!(hash, hash_password("admin2").unwrap());
    }

    #[test]
    fn login_layout() {
        let request = login_request("admin", "hash");
        let mut buf = Buffer::frame(request, ProtoType::Admin).unwrap();

        assert_eq!(0, buf.read_u8().unwrap());
        assert_eq!(0, buf.read_u8().unwrap());
        assert_eq!(Command::Login as u8, buf.read_u8().unwrap());
        assert_eq!(2, buf.read_u8().unwrap());
        buf.skip(12).unwrap();

        let fields = read_fields(&mut buf, 2).unwrap();
        assert_eq!(FieldId::User as u8, fields[0].0);
        assert_eq!(FieldId::Credential as u8, fields[1].0);
        assert!(buf.is_empty());
    }

    #[test]
    fn scoped_global_privilege_is_rejected() {
        let mut request = Request::new(Command::GrantPrivileges);
        let privilege = Privilege {
            code: PrivilegeCode::SysAdmin,
            namespace: Some("test".to_owned()),
            set_name: None,
        };
        assert!(matches!(
            request.privileges(&[privilege]),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn role_record() {
        let mut request = Request::new(Command::QueryRoles);
        request.field(FieldId::Role, b"reporting");
        request
            .privileges(&[
                Privilege::global(PrivilegeCode::SIndexAdmin),
                Privilege::scoped(PrivilegeCode::Read, "test", Some("events")),
            ])
            .unwrap();
        request.field(FieldId::Whitelist, b"10.0.0.1,10.0.0.2");
        request.u32_field(FieldId::ReadQuota, 500);

        let field_count = request.field_count;
        let mut buf = Buffer::from(request.fields.freeze());
        let role = parse_role(&mut buf, field_count).unwrap();

        assert_eq!(
            Role {
                name: "reporting".to_owned(),
                privileges: vec![
                    Privilege::global(PrivilegeCode::SIndexAdmin),
                    Privilege::scoped(PrivilegeCode::Read, "test", Some("events")),
                ],
                allowlist: vec!["10.0.0.1".to_owned(), "10.0.0.2".to_owned()],
                read_quota: 500,
                write_quota: 0,
            },
            role
        );
    }

    #[test]
    fn user_record() {
        let mut request = Request::new(Command::QueryUsers);
        request.field(FieldId::User, b"alice");
        request.names(FieldId::Roles, &["read", "write"]).unwrap();
        request.u32_field(FieldId::Connections, 3);

        let field_count = request.field_count;
        let user = parse_user(&mut Buffer::from(request.fields.freeze()), field_count).unwrap();

        assert_eq!("alice", user.user);
        assert_eq!(vec!["read".to_owned(), "write".to_owned()], user.roles);
        assert_eq!(3, user.conns_in_use);
    }
}
