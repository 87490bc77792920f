use std::fmt::Write;
use substruct_core::mailer::{MailError, OutgoingEmail};
use substruct_core::StorePreferences;
use substruct_shared::money::format_cents;

use crate::models::Order;

/// Receipt for the customer, copied to staff. Needs the receipt template preference.
pub fn receipt_email(order: &Order, prefs: &StorePreferences) -> Result<OutgoingEmail, MailError> {
    let template = prefs
        .receipt_template
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| MailError::MissingTemplate("order receipt".to_string()))?;

    let subject = format!("Thank you for your order! (#{})", order.order_number);
    let customer = order
        .customer_email
        .as_ref()
        .map(|e| e.expose().clone())
        .ok_or_else(|| MailError::NoRecipients(subject.clone()))?;

    let mut body = String::new();
    let _ = writeln!(body, "{}", template.trim_end());
    let _ = writeln!(body);
    let _ = writeln!(body, "Order #{}", order.order_number);
    body.push_str(&order_summary(order));

    Ok(OutgoingEmail {
        from: prefs.mail_from.clone(),
        to: vec![customer],
        bcc: prefs.mail_copy_to.clone(),
        subject,
        body,
    })
}

/// Notice to staff that a payment failed.
pub fn failed_email(order: &Order, prefs: &StorePreferences) -> OutgoingEmail {
    let mut body = String::new();
    let _ = writeln!(body, "Order #{} failed.", order.order_number);
    let _ = writeln!(body, "Customer: {}", order.name());
    let _ = writeln!(body, "Status: {}", order.status.name());
    if let Some(note) = order.notes.last() {
        let _ = writeln!(body, "Last note: {}", note.text);
    }
    let _ = writeln!(body);
    body.push_str(&order_summary(order));

    OutgoingEmail {
        from: prefs.mail_from.clone(),
        to: prefs.mail_copy_to.clone(),
        bcc: Vec::new(),
        subject: "An order has failed on the site".to_string(),
        body,
    }
}

fn order_summary(order: &Order) -> String {
    let mut summary = String::new();
    for line in &order.line_items {
        let _ = writeln!(
            summary,
            "{} x {} @ {} = {}",
            line.quantity,
            line.name,
            format_cents(line.unit_price_cents),
            format_cents(line.total())
        );
    }
    let _ = writeln!(summary, "Subtotal: {}", format_cents(order.line_items_total(true)));
    let _ = writeln!(summary, "Shipping: {}", format_cents(order.shipping_cost_cents));
    let _ = writeln!(summary, "Tax: {}", format_cents(order.tax_cost()));
    let _ = writeln!(summary, "Total: {}", format_cents(order.total()));
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use substruct_catalog::Item;
    use substruct_shared::Masked;

    fn prefs() -> StorePreferences {
        StorePreferences {
            mail_from: "store@example.com".to_string(),
            mail_copy_to: vec!["staff@example.com".to_string()],
            receipt_template: Some("Thanks for shopping with us.".to_string()),
            ..Default::default()
        }
    }

    fn order() -> Order {
        let mut order = Order::new(4242);
        order
            .add_product(&Item::new("Lightsaber", None, 2000, 5), None, 2)
            .unwrap();
        order.shipping_cost_cents = 500;
        order.customer_email = Some(Masked::new("luke@example.com".to_string()));
        order
    }

    #[test]
    fn test_receipt_email() {
        let mail = receipt_email(&order(), &prefs()).unwrap();
        assert_eq!(mail.to, vec!["luke@example.com".to_string()]);
        assert_eq!(mail.bcc, vec!["staff@example.com".to_string()]);
        assert_eq!(mail.subject, "Thank you for your order! (#4242)");
        assert!(mail.body.starts_with("Thanks for shopping with us."));
        assert!(mail.body.contains("2 x Lightsaber @ 20.00 = 40.00"));
        assert!(mail.body.contains("Total: 45.00"));
    }

    #[test]
    fn test_receipt_needs_template_and_customer() {
        let mut p = prefs();
        p.receipt_template = None;
        assert!(matches!(receipt_email(&order(), &p), Err(MailError::MissingTemplate(_))));

        let mut o = order();
        o.customer_email = None;
        assert!(matches!(receipt_email(&o, &prefs()), Err(MailError::NoRecipients(_))));
    }

    #[test]
    fn test_failed_email_goes_to_staff() {
        let mut o = order();
        o.add_note("Order failed! Card declined");
        let mail = failed_email(&o, &prefs());
        assert_eq!(mail.to, vec!["staff@example.com".to_string()]);
        assert!(mail.body.contains("Last note: Order failed! Card declined"));
    }
}
