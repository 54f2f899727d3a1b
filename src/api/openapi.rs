use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::{
    api::models::{
        AdvanceSettlementRequest, AdvanceSettlementResponse, CreateRoomRequest, ErrorResponse, JoinRoomRequest,
        LoginRequest, LoginResponse, RegisterUserRequest,
    },
    core::{
        balance::MemberBalance,
        errors::ErrorKind,
        lifecycle::RoundBalances,
        models::{
            expense::{Expense, ExpenseChanges},
            room::{Member, Role, Room},
            round::{Round, RoundStatus},
            settlement::{Settlement, SettlementStatus},
            user::User,
        },
        services::NewExpense,
    },
};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        super::handlers::login,
        super::handlers::register_user,
        super::handlers::get_user,
        super::handlers::create_room,
        super::handlers::join_room,
        super::handlers::get_room,
        super::handlers::list_members,
        super::handlers::current_round,
        super::handlers::list_rounds,
        super::handlers::add_expense,
        super::handlers::list_expenses,
        super::handlers::update_expense,
        super::handlers::delete_expense,
        super::handlers::get_balances,
        super::handlers::get_round_balances,
        super::handlers::generate_settlements,
        super::handlers::list_settlements,
        super::handlers::list_round_settlements,
        super::handlers::advance_settlement
    ),
    components(schemas(
        RegisterUserRequest,
        LoginRequest,
        LoginResponse,
        CreateRoomRequest,
        JoinRoomRequest,
        NewExpense,
        ExpenseChanges,
        AdvanceSettlementRequest,
        AdvanceSettlementResponse,
        ErrorResponse,
        ErrorKind,
        User,
        Room,
        Member,
        Role,
        Round,
        RoundStatus,
        Expense,
        Settlement,
        SettlementStatus,
        MemberBalance,
        RoundBalances
    )),
    modifiers(&BearerAuth),
    info(
        title = "Roomtab API",
        description = "Shared expenses, per-round balances and settlement tracking for rooms",
        version = "0.1.0"
    )
)]
pub struct ApiDoc;
