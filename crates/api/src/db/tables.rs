//! Compile-time–checked column identifiers for all tables.

use sea_query::Iden;

#[derive(Iden)]
pub enum Users {
    Table,
    Id,
    Email,
    Username,
    PasswordHash,
    PasswordSalt,
    FirstName,
    LastName,
    CreatedAt,
}

#[derive(Iden)]
pub enum UserTokens {
    Table,
    Id,
    UserId,
    TokenHash,
    TokenType,
    ExpiresAt,
    CreatedAt,
}

#[derive(Iden)]
pub enum WebSessions {
    Table,
    IdHash,
    Data,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub enum Organizations {
    Table,
    Id,
    Name,
    CreatedAt,
}

#[derive(Iden)]
pub enum OrganizationUsers {
    Table,
    Id,
    OrganizationId,
    UserId,
    IsOrganizationAdmin,
    Active,
    CreatedAt,
}

#[derive(Iden)]
pub enum OrganizationInvitations {
    Table,
    Id,
    OrganizationId,
    UserId,
    InvitedBy,
    CreatedAt,
}

#[derive(Iden)]
pub enum Teams {
    Table,
    Id,
    Name,
    OrganizationId,
    TeamLeadId,
    CreatedAt,
}

#[derive(Iden)]
pub enum TeamMembers {
    Table,
    Id,
    TeamId,
    OrganizationUserId,
    Active,
    CreatedAt,
}

#[derive(Iden)]
pub enum TeamAdmins {
    Table,
    Id,
    TeamId,
    OrganizationUserId,
    CreatedAt,
}

#[derive(Iden)]
pub enum TeamMemberStatuses {
    Table,
    Id,
    TeamMemberId,
    Day,
    Status,
    InfoForTeam,
    InfoForLead,
    UpdatedAt,
}

#[derive(Iden)]
pub enum EmailLog {
    Table,
    Id,
    EmailType,
    ToEmail,
    FromEmail,
    Subject,
    Body,
    CreatedAt,
}
