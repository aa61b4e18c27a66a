use chrono::{NaiveDate, Utc};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::OrchestratorConfig;
use crate::extract::merge_envelope;
use crate::matcher::{
    MatchOutcome, OptionCandidate, date_from_timestamp, date_label, find_clock_time, match_date,
    match_option, match_time,
};
use crate::models::{BookingState, FlowStep};
use crate::session::Session;
use crate::tools::{CART_ID_ARGUMENT, ToolEnvelope, ToolGateway, ToolName};

const MAX_LISTED_OPTIONS: usize = 12;
const MIN_MATCH_WORD_LETTERS: usize = 4;

pub const LOCATION_PROMPT: &str = "Which location would you like to book at?";
pub const SERVICE_PROMPT: &str = "Which service would you like?";
pub const DATE_PROMPT: &str = "Which date works for you?";
pub const TIME_PROMPT: &str = "Which time would you like?";
pub const STAFF_PROMPT: &str =
    "Do you have a preferred staff member? You can also say \"no preference\".";
const NO_MATCH_PREFIX: &str = "Sorry, I couldn't match that to one of the options.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prerequisite {
    Location,
    Cart,
    Service,
    Date,
    Time,
    Staff,
    Summary,
}

impl Prerequisite {
    fn user_message(self) -> &'static str {
        match self {
            Self::Location => "I need to know which location you'd like first.",
            Self::Cart => "I need to start your booking at a location first. Which location would you like?",
            Self::Service => "Please choose a service first.",
            Self::Date => "Please choose a date first.",
            Self::Time => "Please choose a time first.",
            Self::Staff => "Please choose a staff member first, or say \"no preference\".",
            Self::Summary => "Let me put together your booking summary before confirming.",
        }
    }
}

/// Reasons a booking step could not run. These become corrective replies,
/// never turn failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    #[error("missing prerequisite {0:?}")]
    MissingPrerequisite(Prerequisite),
    #[error("tool {0} failed: {1}")]
    Unavailable(ToolName, String),
    #[error("tool {0} returned no options")]
    NoOptions(ToolName),
}

impl StepError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::MissingPrerequisite(prerequisite) => prerequisite.user_message(),
            Self::Unavailable(..) => {
                "I couldn't reach the booking system just now. Please try again."
            }
            Self::NoOptions(ToolName::ListLocations) => {
                "I couldn't find any locations to book at right now."
            }
            Self::NoOptions(ToolName::ListServices) => {
                "This location has no services available to book right now."
            }
            Self::NoOptions(ToolName::ListBookableDates) => {
                "There are no open dates for that service right now."
            }
            Self::NoOptions(ToolName::ListBookableTimes) => {
                "There are no open times on that day. Please pick another date."
            }
            Self::NoOptions(ToolName::ListStaffVariants) => {
                "No staff members can be chosen for this service."
            }
            Self::NoOptions(_) => "Nothing is available for that right now.",
        }
    }
}

/// Where a choice is validated: the list last shown to the user, or a fresh
/// fetch from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionSource {
    Cached,
    Live,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotReservation {
    Reserved,
    NeedsChoice { options: Vec<String> },
}

/// Booking operations shared by both flow strategies. Each one talks to the
/// tool backend through the gateway and merges what comes back into the
/// session.
#[derive(Clone)]
pub struct BookingSteps {
    gateway: ToolGateway,
    time_tolerance_minutes: u32,
    accept_unlisted_time: bool,
    offer_staff_choice: bool,
}

impl BookingSteps {
    pub fn new(gateway: ToolGateway, config: &OrchestratorConfig) -> Self {
        Self {
            gateway,
            time_tolerance_minutes: config.time_tolerance_minutes,
            accept_unlisted_time: config.accept_unlisted_time,
            offer_staff_choice: config.offer_staff_choice,
        }
    }

    pub fn offers_staff_choice(&self) -> bool {
        self.offer_staff_choice
    }

    pub async fn fetch_locations(
        &self,
        session: &mut Session,
    ) -> Result<Vec<OptionCandidate>, StepError> {
        let options = self.list(session, ToolName::ListLocations, json!({})).await?;
        session.options.locations = Some(options.clone());
        session.step = FlowStep::LocationPending;
        Ok(options)
    }

    pub async fn choose_location(
        &self,
        session: &mut Session,
        value: Option<&str>,
        source: OptionSource,
    ) -> Result<MatchOutcome, StepError> {
        let candidates = match (source, session.options.locations.clone()) {
            (OptionSource::Cached, Some(cached)) => cached,
            _ => self.fetch_locations(session).await?,
        };

        let outcome = match_free_text(&candidates, value, |text| {
            match_option(&candidates, Some(text))
        });
        if let MatchOutcome::Valid { id, name } = &outcome {
            if session.booking.location_id.as_deref() != Some(id.as_str()) {
                session.booking = BookingState {
                    location_id: Some(id.clone()),
                    location_name: Some(name.clone()),
                    ..BookingState::default()
                };
                session.options.services = None;
                session.options.dates = None;
                session.options.times = None;
                session.options.staff = None;
            }
            info!(session_id = %session.id, location_id = %id, "location selected");
        }
        Ok(outcome)
    }

    pub async fn create_cart(&self, session: &mut Session) -> Result<String, StepError> {
        let location_id = session
            .booking
            .location_id
            .clone()
            .ok_or(StepError::MissingPrerequisite(Prerequisite::Location))?;

        let envelope = self
            .gateway
            .call(ToolName::CreateCart, json!({"locationId": location_id}))
            .await;
        if let ToolEnvelope::Error { message, .. } = &envelope {
            return Err(StepError::Unavailable(ToolName::CreateCart, message.clone()));
        }

        // A new cart starts without any of the previous cart's selections.
        let booking = &mut session.booking;
        booking.cart_id = None;
        booking.service_id = None;
        booking.service_name = None;
        booking.service_item_id = None;
        booking.promotion_offer_id = None;
        booking.total_amount = None;
        booking.clear_selection();
        merge_envelope(&envelope, session);

        let Some(cart_id) = session.booking.cart_id.clone() else {
            return Err(StepError::Unavailable(
                ToolName::CreateCart,
                "response carried no cart id".to_string(),
            ));
        };
        session.step = FlowStep::CartCreated;
        info!(session_id = %session.id, cart_id = %cart_id, "cart created");
        Ok(cart_id)
    }

    pub async fn fetch_services(
        &self,
        session: &mut Session,
    ) -> Result<Vec<OptionCandidate>, StepError> {
        let cart_id = require_cart(session)?;
        let options = self
            .list(session, ToolName::ListServices, json!({CART_ID_ARGUMENT: cart_id}))
            .await?;
        session.options.services = Some(options.clone());
        session.step = FlowStep::ServicePending;
        Ok(options)
    }

    pub async fn choose_service(
        &self,
        session: &mut Session,
        value: Option<&str>,
        source: OptionSource,
    ) -> Result<MatchOutcome, StepError> {
        let candidates = match (source, session.options.services.clone()) {
            (OptionSource::Cached, Some(cached)) => cached,
            _ => self.fetch_services(session).await?,
        };

        let outcome = match_free_text(&candidates, value, |text| {
            match_option(&candidates, Some(text))
        });
        if let MatchOutcome::Valid { id, name } = &outcome {
            if session.booking.service_id.as_deref() != Some(id.as_str()) {
                session.booking.service_id = Some(id.clone());
                session.booking.service_name = Some(name.clone());
                session.booking.service_item_id = None;
                session.booking.clear_selection();
                session.options.dates = None;
                session.options.times = None;
                session.options.staff = None;
            }
            session.step = FlowStep::ServiceSelected;
            info!(session_id = %session.id, service_id = %id, "service selected");
        }
        Ok(outcome)
    }

    pub async fn add_service(&self, session: &mut Session) -> Result<(), StepError> {
        let cart_id = require_cart(session)?;
        let service_id = session
            .booking
            .service_id
            .clone()
            .ok_or(StepError::MissingPrerequisite(Prerequisite::Service))?;

        session.booking.service_item_id = None;
        self.mutate(
            session,
            ToolName::AddService,
            json!({CART_ID_ARGUMENT: cart_id, "serviceId": service_id}),
        )
        .await?;

        if session.booking.service_item_id.is_none() {
            return Err(StepError::Unavailable(
                ToolName::AddService,
                "response carried no cart line".to_string(),
            ));
        }
        session.step = FlowStep::ServiceSelected;
        Ok(())
    }

    pub async fn fetch_dates(
        &self,
        session: &mut Session,
    ) -> Result<Vec<OptionCandidate>, StepError> {
        let cart_id = require_cart(session)?;
        require_cart_line(session)?;
        let options = self
            .list(
                session,
                ToolName::ListBookableDates,
                json!({CART_ID_ARGUMENT: cart_id}),
            )
            .await?;
        session.options.dates = Some(options.clone());
        session.step = FlowStep::DatePending;
        Ok(options)
    }

    pub async fn choose_date(
        &self,
        session: &mut Session,
        value: Option<&str>,
        source: OptionSource,
    ) -> Result<MatchOutcome, StepError> {
        let candidates = match (source, session.options.dates.clone()) {
            (OptionSource::Cached, Some(cached)) => cached,
            _ => self.fetch_dates(session).await?,
        };

        let today = today();
        let outcome = match_free_text(&candidates, value, |text| {
            match_date(&candidates, Some(text), today)
        });
        if let MatchOutcome::Valid { id, .. } = &outcome {
            session.booking.date = Some(id.clone());
            session.booking.time = None;
            session.booking.bookable_time_id = None;
            session.booking.staff_variant_id = None;
            session.booking.staff_name = None;
            session.options.times = None;
            session.options.staff = None;
            session.step = FlowStep::DateSelected;
            info!(session_id = %session.id, date = %id, "date selected");
        }
        Ok(outcome)
    }

    pub async fn fetch_times(
        &self,
        session: &mut Session,
    ) -> Result<Vec<OptionCandidate>, StepError> {
        let cart_id = require_cart(session)?;
        let date = session
            .booking
            .date
            .clone()
            .ok_or(StepError::MissingPrerequisite(Prerequisite::Date))?;
        let options = self
            .list(
                session,
                ToolName::ListBookableTimes,
                json!({CART_ID_ARGUMENT: cart_id, "date": date}),
            )
            .await?;
        session.options.times = Some(options.clone());
        session.step = FlowStep::TimePending;
        Ok(options)
    }

    /// Picks a slot. Without a cached slot list and with unlisted times
    /// allowed, the requested time is taken as given and only resolved to a
    /// slot when it is reserved.
    pub async fn choose_time(
        &self,
        session: &mut Session,
        value: Option<&str>,
        source: OptionSource,
    ) -> Result<MatchOutcome, StepError> {
        let candidates = match session.options.times.clone() {
            Some(cached) if source == OptionSource::Cached => cached,
            Some(_) => self.fetch_times(session).await?,
            None if self.accept_unlisted_time => {
                return Ok(accept_unlisted_time(session, value));
            }
            None => self.fetch_times(session).await?,
        };

        let tolerance = self.time_tolerance_minutes;
        let outcome = match_free_text(&candidates, value, |text| {
            match_time(&candidates, Some(text), tolerance)
        });
        if let MatchOutcome::Valid { id, name } = &outcome {
            session.booking.time = Some(name.clone());
            session.booking.bookable_time_id = Some(id.clone());
            info!(session_id = %session.id, bookable_time_id = %id, "time selected");
        }
        Ok(outcome)
    }

    pub async fn reserve_slot(&self, session: &mut Session) -> Result<SlotReservation, StepError> {
        let cart_id = require_cart(session)?;

        if session.booking.bookable_time_id.is_none() {
            let requested = session
                .booking
                .time
                .clone()
                .ok_or(StepError::MissingPrerequisite(Prerequisite::Time))?;
            let candidates = self.fetch_times(session).await?;
            match match_time(&candidates, Some(&requested), self.time_tolerance_minutes) {
                MatchOutcome::Valid { id, name } => {
                    session.booking.time = Some(name);
                    session.booking.bookable_time_id = Some(id);
                }
                MatchOutcome::Invalid { options } => {
                    session.booking.time = None;
                    return Ok(SlotReservation::NeedsChoice { options });
                }
            }
        }

        let Some(bookable_time_id) = session.booking.bookable_time_id.clone() else {
            return Err(StepError::MissingPrerequisite(Prerequisite::Time));
        };
        self.mutate(
            session,
            ToolName::ReserveSlot,
            json!({CART_ID_ARGUMENT: cart_id, "bookableTimeId": bookable_time_id}),
        )
        .await?;
        session.step = FlowStep::TimeSelected;
        info!(session_id = %session.id, bookable_time_id = %bookable_time_id, "slot reserved");
        Ok(SlotReservation::Reserved)
    }

    pub async fn fetch_staff(
        &self,
        session: &mut Session,
    ) -> Result<Vec<OptionCandidate>, StepError> {
        let cart_id = require_cart(session)?;
        let item_id = require_cart_line(session)?;
        let options = self
            .list(
                session,
                ToolName::ListStaffVariants,
                json!({CART_ID_ARGUMENT: cart_id, "itemId": item_id}),
            )
            .await?;
        session.options.staff = Some(options.clone());
        session.step = FlowStep::StaffPending;
        Ok(options)
    }

    pub async fn choose_staff(
        &self,
        session: &mut Session,
        value: Option<&str>,
        source: OptionSource,
    ) -> Result<MatchOutcome, StepError> {
        let candidates = match (source, session.options.staff.clone()) {
            (OptionSource::Cached, Some(cached)) => cached,
            _ => self.fetch_staff(session).await?,
        };

        let outcome = match_free_text(&candidates, value, |text| {
            match_option(&candidates, Some(text))
        });
        if let MatchOutcome::Valid { id, name } = &outcome {
            session.booking.staff_variant_id = Some(id.clone());
            session.booking.staff_name = Some(name.clone());
        }
        Ok(outcome)
    }

    pub async fn assign_staff(&self, session: &mut Session) -> Result<(), StepError> {
        let cart_id = require_cart(session)?;
        let item_id = require_cart_line(session)?;
        let staff_variant_id = session
            .booking
            .staff_variant_id
            .clone()
            .ok_or(StepError::MissingPrerequisite(Prerequisite::Staff))?;

        self.mutate(
            session,
            ToolName::AssignStaff,
            json!({
                CART_ID_ARGUMENT: cart_id,
                "itemId": item_id,
                "staffVariantId": staff_variant_id
            }),
        )
        .await?;
        session.step = FlowStep::StaffSelected;
        info!(session_id = %session.id, staff_variant_id = %staff_variant_id, "staff assigned");
        Ok(())
    }

    pub fn skip_staff(&self, session: &mut Session) {
        session.booking.staff_variant_id = None;
        session.booking.staff_name = None;
        session.step = FlowStep::StaffSelected;
    }

    /// Refreshes the cart summary and renders it for confirmation. A failed
    /// refresh still renders what the session already knows.
    pub async fn summary(&self, session: &mut Session) -> Result<String, StepError> {
        let cart_id = require_cart(session)?;
        let envelope = self
            .gateway
            .call(ToolName::GetCartSummary, json!({CART_ID_ARGUMENT: cart_id}))
            .await;
        if let ToolEnvelope::Error { message, .. } = &envelope {
            warn!(session_id = %session.id, error = %message, "cart summary refresh failed");
        }
        merge_envelope(&envelope, session);
        session.step = FlowStep::SummaryReady;
        Ok(render_summary(&session.booking))
    }

    pub async fn location_prompt(&self, session: &mut Session) -> Result<String, StepError> {
        let options = self.fetch_locations(session).await?;
        Ok(render_options(LOCATION_PROMPT, &names(&options)))
    }

    pub async fn service_prompt(&self, session: &mut Session) -> Result<String, StepError> {
        let options = self.fetch_services(session).await?;
        Ok(render_options(SERVICE_PROMPT, &names(&options)))
    }

    pub async fn date_prompt(&self, session: &mut Session) -> Result<String, StepError> {
        let options = self.fetch_dates(session).await?;
        Ok(render_options(DATE_PROMPT, &names(&options)))
    }

    pub async fn time_prompt(&self, session: &mut Session) -> Result<String, StepError> {
        let options = self.fetch_times(session).await?;
        Ok(render_options(TIME_PROMPT, &names(&options)))
    }

    pub async fn staff_prompt(&self, session: &mut Session) -> Result<String, StepError> {
        let options = self.fetch_staff(session).await?;
        Ok(render_options(STAFF_PROMPT, &names(&options)))
    }

    async fn list(
        &self,
        session: &mut Session,
        tool: ToolName,
        arguments: Value,
    ) -> Result<Vec<OptionCandidate>, StepError> {
        let envelope = self.gateway.call(tool, arguments).await;
        merge_envelope(&envelope, session);

        match envelope {
            ToolEnvelope::Error { message, .. } => Err(StepError::Unavailable(tool, message)),
            ToolEnvelope::Ok { output, .. } => {
                let options = output.options().unwrap_or_default();
                if options.is_empty() {
                    Err(StepError::NoOptions(tool))
                } else {
                    Ok(options)
                }
            }
        }
    }

    async fn mutate(
        &self,
        session: &mut Session,
        tool: ToolName,
        arguments: Value,
    ) -> Result<(), StepError> {
        let envelope = self.gateway.call(tool, arguments).await;
        match &envelope {
            ToolEnvelope::Error { message, .. } => {
                Err(StepError::Unavailable(tool, message.clone()))
            }
            ToolEnvelope::Ok { .. } => {
                merge_envelope(&envelope, session);
                Ok(())
            }
        }
    }
}

/// Matches the whole message first, then each word of four or more letters.
pub fn match_free_text<F>(
    candidates: &[OptionCandidate],
    message: Option<&str>,
    matcher: F,
) -> MatchOutcome
where
    F: Fn(&str) -> MatchOutcome,
{
    let Some(message) = message.map(str::trim).filter(|text| !text.is_empty()) else {
        return match_option(candidates, None);
    };

    let whole = matcher(message);
    if whole.is_valid() {
        return whole;
    }

    message
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| word.chars().filter(|ch| ch.is_alphabetic()).count() >= MIN_MATCH_WORD_LETTERS)
        .map(&matcher)
        .find(MatchOutcome::is_valid)
        .unwrap_or(whole)
}

pub fn render_options(intro: &str, options: &[String]) -> String {
    if options.is_empty() {
        return intro.to_string();
    }

    let mut lines = vec![intro.to_string()];
    lines.extend(
        options
            .iter()
            .take(MAX_LISTED_OPTIONS)
            .map(|option| format!("- {option}")),
    );
    if options.len() > MAX_LISTED_OPTIONS {
        lines.push(format!("...and {} more.", options.len() - MAX_LISTED_OPTIONS));
    }
    lines.join("\n")
}

pub fn reprompt(prompt: &str, options: &[String]) -> String {
    render_options(&format!("{NO_MATCH_PREFIX} {prompt}"), options)
}

pub fn render_summary(booking: &BookingState) -> String {
    let mut lines = vec!["Here's your booking:".to_string()];
    if let Some(location) = booking.location_name.as_deref() {
        lines.push(format!("- Location: {location}"));
    }
    if let Some(service) = booking.service_name.as_deref() {
        lines.push(format!("- Service: {service}"));
    }
    if let Some(date) = booking.date.as_deref() {
        let label = date_from_timestamp(date)
            .map(date_label)
            .unwrap_or_else(|| date.to_string());
        lines.push(format!("- Date: {label}"));
    }
    if let Some(time) = booking.time.as_deref() {
        lines.push(format!("- Time: {time}"));
    }
    lines.push(format!(
        "- Staff: {}",
        booking.staff_name.as_deref().unwrap_or("No preference")
    ));
    if let Some(total) = booking.formatted_total() {
        lines.push(format!("- Total: ${total}"));
    }
    lines.push("Shall I confirm this booking? (yes/no)".to_string());
    lines.join("\n")
}

pub fn names(options: &[OptionCandidate]) -> Vec<String> {
    options.iter().map(|option| option.name.clone()).collect()
}

fn accept_unlisted_time(session: &mut Session, value: Option<&str>) -> MatchOutcome {
    let Some(value) = value.map(str::trim).filter(|text| !text.is_empty()) else {
        return MatchOutcome::Invalid {
            options: Vec::new(),
        };
    };

    let label = find_clock_time(value)
        .map(|clock| clock.display())
        .unwrap_or_else(|| value.to_string());
    session.booking.time = Some(label.clone());
    session.booking.bookable_time_id = None;
    info!(session_id = %session.id, time = %label, "unlisted time accepted");
    MatchOutcome::Valid {
        id: label.clone(),
        name: label,
    }
}

fn require_cart(session: &Session) -> Result<String, StepError> {
    session
        .booking
        .cart_id
        .clone()
        .ok_or(StepError::MissingPrerequisite(Prerequisite::Cart))
}

fn require_cart_line(session: &Session) -> Result<String, StepError> {
    session
        .booking
        .service_item_id
        .clone()
        .ok_or(StepError::MissingPrerequisite(Prerequisite::Service))
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}
