use tracing::{info, warn};

use super::intent::{
    is_affirmation, is_booking_request, is_decline, is_no_preference, service_hint,
};
use super::steps::{
    BookingSteps, DATE_PROMPT, LOCATION_PROMPT, OptionSource, SERVICE_PROMPT, STAFF_PROMPT,
    SlotReservation, StepError, TIME_PROMPT, match_free_text, names, render_options, reprompt,
};
use super::{CONFIRMED_INSTRUCTIONS, FlowDriver, FlowFuture, FlowOutcome, FlowStrategy};
use crate::matcher::{MatchOutcome, match_option};
use crate::models::{BookingState, FlowStep};
use crate::session::{OptionCache, Session};

const GREETING: &str = "Hi! I can help you book an appointment.";
const CANCELLED_REPLY: &str =
    "No problem, I've cancelled that booking. Let me know if you'd like to book something else.";

/// Code-driven flow: every reply is validated against the option list the
/// user was shown, and side effects that follow from a valid answer run
/// immediately.
pub struct GuidedFlow {
    steps: BookingSteps,
}

impl GuidedFlow {
    pub fn new(steps: BookingSteps) -> Self {
        Self { steps }
    }

    async fn handle(
        &self,
        session: &mut Session,
        message: &str,
    ) -> Result<FlowOutcome, StepError> {
        let reply = match session.step {
            FlowStep::New | FlowStep::Cancelled => {
                if !is_booking_request(message) {
                    return Ok(FlowOutcome::Handoff { instructions: None });
                }
                session.service_hint = service_hint(message);
                self.proceed(session).await?
            }
            FlowStep::LocationPending => {
                if session.service_hint.is_none() && is_booking_request(message) {
                    session.service_hint = service_hint(message);
                }
                match self
                    .steps
                    .choose_location(session, Some(message), OptionSource::Cached)
                    .await?
                {
                    MatchOutcome::Valid { name, .. } => {
                        let next = self.proceed(session).await?;
                        format!("Great, {name} it is. {next}")
                    }
                    MatchOutcome::Invalid { options } => reprompt(LOCATION_PROMPT, &options),
                }
            }
            FlowStep::ServicePending => match self
                .steps
                .choose_service(session, Some(message), OptionSource::Cached)
                .await?
            {
                MatchOutcome::Valid { name, .. } => {
                    let next = self.proceed(session).await?;
                    format!("{name}, good choice. {next}")
                }
                MatchOutcome::Invalid { options } => reprompt(SERVICE_PROMPT, &options),
            },
            FlowStep::DatePending => match self
                .steps
                .choose_date(session, Some(message), OptionSource::Cached)
                .await?
            {
                MatchOutcome::Valid { .. } => self.proceed(session).await?,
                MatchOutcome::Invalid { options } => reprompt(DATE_PROMPT, &options),
            },
            FlowStep::TimePending => match self
                .steps
                .choose_time(session, Some(message), OptionSource::Cached)
                .await?
            {
                MatchOutcome::Valid { .. } => self.proceed(session).await?,
                MatchOutcome::Invalid { options } => reprompt(TIME_PROMPT, &options),
            },
            FlowStep::StaffPending => {
                if is_no_preference(message) {
                    self.steps.skip_staff(session);
                    self.proceed(session).await?
                } else {
                    match self
                        .steps
                        .choose_staff(session, Some(message), OptionSource::Cached)
                        .await?
                    {
                        MatchOutcome::Valid { .. } => {
                            self.steps.assign_staff(session).await?;
                            self.proceed(session).await?
                        }
                        MatchOutcome::Invalid { options } => reprompt(STAFF_PROMPT, &options),
                    }
                }
            }
            FlowStep::SummaryReady => {
                if is_affirmation(message) {
                    session.step = FlowStep::Confirmed;
                    info!(session_id = %session.id, "booking confirmed");
                    return Ok(FlowOutcome::Handoff {
                        instructions: Some(CONFIRMED_INSTRUCTIONS.to_string()),
                    });
                }
                if is_decline(message) {
                    cancel_booking(session);
                    CANCELLED_REPLY.to_string()
                } else {
                    return Ok(FlowOutcome::Handoff { instructions: None });
                }
            }
            FlowStep::Confirmed => return Ok(FlowOutcome::Handoff { instructions: None }),
            FlowStep::CartCreated
            | FlowStep::ServiceSelected
            | FlowStep::DateSelected
            | FlowStep::TimeSelected
            | FlowStep::StaffSelected => self.proceed(session).await?,
        };

        Ok(FlowOutcome::Reply(reply))
    }

    /// Runs every step the booking state already allows and returns the next
    /// question for the user.
    async fn proceed(&self, session: &mut Session) -> Result<String, StepError> {
        if session.booking.location_id.is_none() {
            return self.steps.location_prompt(session).await;
        }
        if session.booking.cart_id.is_none() {
            self.steps.create_cart(session).await?;
        }

        if session.booking.service_item_id.is_none() {
            if session.booking.service_id.is_none() {
                let services = self.steps.fetch_services(session).await?;
                let hinted = session.service_hint.take().map(|hint| {
                    match_free_text(&services, Some(&hint), |text| {
                        match_option(&services, Some(text))
                    })
                });
                match hinted {
                    Some(MatchOutcome::Valid { name, .. }) => {
                        self.steps
                            .choose_service(session, Some(&name), OptionSource::Cached)
                            .await?;
                    }
                    _ => return Ok(render_options(SERVICE_PROMPT, &names(&services))),
                }
            }
            self.steps.add_service(session).await?;
        }

        if session.booking.date.is_none() {
            return self.steps.date_prompt(session).await;
        }

        if session.step < FlowStep::TimeSelected {
            if session.booking.time.is_none() {
                return self.steps.time_prompt(session).await;
            }
            if let SlotReservation::NeedsChoice { options } =
                self.steps.reserve_slot(session).await?
            {
                return Ok(reprompt(TIME_PROMPT, &options));
            }
        }

        if session.step == FlowStep::TimeSelected && self.steps.offers_staff_choice() {
            match self.steps.staff_prompt(session).await {
                Ok(prompt) => return Ok(prompt),
                Err(StepError::MissingPrerequisite(prerequisite)) => {
                    return Err(StepError::MissingPrerequisite(prerequisite));
                }
                Err(err) => {
                    warn!(session_id = %session.id, error = %err, "skipping staff choice");
                    self.steps.skip_staff(session);
                }
            }
        }

        self.steps.summary(session).await
    }
}

impl FlowDriver for GuidedFlow {
    fn strategy(&self) -> FlowStrategy {
        FlowStrategy::Guided
    }

    fn start<'a>(&'a self, session: &'a mut Session) -> FlowFuture<'a> {
        Box::pin(async move {
            match self.steps.location_prompt(session).await {
                Ok(prompt) => FlowOutcome::Reply(format!("{GREETING} {prompt}")),
                Err(err) => FlowOutcome::Reply(err.user_message().to_string()),
            }
        })
    }

    fn advance<'a>(&'a self, session: &'a mut Session, message: &'a str) -> FlowFuture<'a> {
        Box::pin(async move {
            let step_before = session.step;
            match self.handle(session, message).await {
                Ok(outcome) => {
                    if session.step != step_before {
                        info!(
                            session_id = %session.id,
                            from = step_before.as_str(),
                            to = session.step.as_str(),
                            "booking step advanced"
                        );
                    }
                    outcome
                }
                Err(err) => {
                    warn!(
                        session_id = %session.id,
                        step = session.step.as_str(),
                        error = %err,
                        "booking step could not run"
                    );
                    FlowOutcome::Reply(err.user_message().to_string())
                }
            }
        })
    }
}

fn cancel_booking(session: &mut Session) {
    session.booking = BookingState::default();
    session.options = OptionCache::default();
    session.service_hint = None;
    session.step = FlowStep::Cancelled;
    info!(session_id = %session.id, "booking cancelled");
}
